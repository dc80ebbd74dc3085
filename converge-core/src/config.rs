use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Errors raised while loading or resolving engine configuration.
#[derive(Debug)]
pub enum ConfigError {
    NotFound(PathBuf),
    Parse { path: PathBuf, reason: String },
    Validation(String),
    UnresolvedPlaceholder(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound(p) => write!(f, "config file not found: {}", p.display()),
            ConfigError::Parse { path, reason } => {
                write!(f, "failed to parse {}: {reason}", path.display())
            }
            ConfigError::Validation(msg) => write!(f, "invalid configuration: {msg}"),
            ConfigError::UnresolvedPlaceholder(key) => {
                write!(f, "unresolved configuration placeholder: ${{{key}}}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            path: PathBuf::new(),
            reason: e.to_string(),
        }
    }
}

/// Engine-level tunables: worker parallelism, queue bounds, alias cap, and
/// the persistence target the snapshot manager writes through.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Degree of parallelism `P` for the step executor's worker pool.
    pub parallel: usize,
    /// Bound on the generator's registration queue; the monitor's
    /// RegisterResource blocks once this many registrations are queued.
    pub registration_queue_bound: usize,
    /// Hard cap on alias URNs materialized per registration.
    pub alias_cap: usize,
    /// Whether a single protect violation aborts the whole run
    /// (ContinueOnError=false) or only that step.
    pub continue_on_error: bool,
    /// Logical name of the persistence target the snapshot manager persists
    /// through (resolved by the embedding application, not this crate).
    pub persistence_target: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            parallel: 4,
            registration_queue_bound: 1024,
            alias_cap: crate::alias::MAX_ALIASES_PER_REGISTRATION,
            continue_on_error: true,
            persistence_target: "local".into(),
        }
    }
}

/// Resolves `${...}` placeholders embedded in configuration values (for
/// example, `${env:AWS_SECRET}`) without ever logging the resolved value.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, key: &str) -> Option<String>;
}

/// Resolves `${env:NAME}` placeholders against process environment variables.
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, key: &str) -> Option<String> {
        let name = key.strip_prefix("env:")?;
        std::env::var(name).ok()
    }
}

/// Replace every `${...}` placeholder in `input` using `resolver`, failing
/// if any placeholder cannot be resolved.
pub fn resolve_placeholders(input: &str, resolver: &dyn SecretResolver) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            out.push_str(rest);
            return Ok(out);
        };
        out.push_str(&rest[..start]);
        let key = &rest[start + 2..start + end];
        let value = resolver
            .resolve(key)
            .ok_or_else(|| ConfigError::UnresolvedPlaceholder(key.to_string()))?;
        out.push_str(&value);
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// A loaded, typed configuration value with access to the underlying profile
/// it was assembled from. Wraps `T` so callers can `Deref` straight into
/// their typed settings.
pub struct EngineConfig<T> {
    inner: T,
    pub profile: Option<String>,
}

impl<T> Deref for EngineConfig<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> EngineConfig<T> {
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// Load engine configuration from `application.yaml`, optionally overridden
/// by `application-{profile}.yaml`, then `.env`/`.env.{profile}` files
/// (loaded without overwriting variables already present in the process
/// environment), then an environment-variable overlay. Resolution order
/// mirrors a base-plus-override-plus-env-overlay layering: later layers win.
pub fn load_engine_settings(dir: &Path, profile: Option<&str>) -> Result<EngineConfig<EngineSettings>, ConfigError> {
    let base_path = dir.join("application.yaml");
    let mut value: serde_yaml::Value = if base_path.exists() {
        let text = std::fs::read_to_string(&base_path).map_err(|_| ConfigError::NotFound(base_path.clone()))?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: base_path.clone(),
            reason: e.to_string(),
        })?
    } else {
        serde_yaml::Value::Mapping(Default::default())
    };

    if let Some(profile) = profile {
        let override_path = dir.join(format!("application-{profile}.yaml"));
        if override_path.exists() {
            let text = std::fs::read_to_string(&override_path)
                .map_err(|_| ConfigError::NotFound(override_path.clone()))?;
            let override_value: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: override_path.clone(),
                reason: e.to_string(),
            })?;
            merge_yaml(&mut value, override_value);
        }
        let _ = dotenvy::from_filename(dir.join(format!(".env.{profile}")));
    }
    let _ = dotenvy::from_filename(dir.join(".env"));

    apply_env_overlay(&mut value);

    let settings: EngineSettings = serde_yaml::from_value(value).map_err(ConfigError::from)?;
    if settings.parallel == 0 {
        return Err(ConfigError::Validation("parallel must be at least 1".into()));
    }
    Ok(EngineConfig {
        inner: settings,
        profile: profile.map(str::to_string),
    })
}

fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Overlay environment variables named `ENGINE_<FIELD_UPPER_SNAKE>` onto the
/// mapping, never clobbering a key the overlay doesn't name.
fn apply_env_overlay(value: &mut serde_yaml::Value) {
    let serde_yaml::Value::Mapping(map) = value else {
        return;
    };
    let overlay: HashMap<String, String> = std::env::vars()
        .filter_map(|(k, v)| {
            let field = k.strip_prefix("ENGINE_")?.to_lowercase();
            Some((field, v))
        })
        .collect();
    for (field, raw) in overlay {
        let key = serde_yaml::Value::String(field);
        let parsed = serde_yaml::Value::String(raw.clone());
        let parsed = raw
            .parse::<i64>()
            .map(|n| serde_yaml::Value::Number(serde_yaml::Number::from(n)))
            .ok()
            .or_else(|| raw.parse::<bool>().map(serde_yaml::Value::Bool).ok())
            .unwrap_or(parsed);
        map.insert(key, parsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver;
    impl SecretResolver for FixedResolver {
        fn resolve(&self, key: &str) -> Option<String> {
            if key == "env:SECRET" {
                Some("shh".into())
            } else {
                None
            }
        }
    }

    #[test]
    fn resolve_placeholders_substitutes_known_keys() {
        let out = resolve_placeholders("token=${env:SECRET}", &FixedResolver).unwrap();
        assert_eq!(out, "token=shh");
    }

    #[test]
    fn resolve_placeholders_fails_on_unknown_key() {
        let err = resolve_placeholders("token=${env:MISSING}", &FixedResolver).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedPlaceholder(_)));
    }

    #[test]
    fn default_settings_are_sane() {
        let s = EngineSettings::default();
        assert!(s.parallel >= 1);
        assert!(s.alias_cap > 0);
    }

    #[test]
    fn load_from_empty_dir_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_engine_settings(dir.path(), None).unwrap();
        assert_eq!(cfg.parallel, EngineSettings::default().parallel);
    }

    #[test]
    fn base_yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("application.yaml"), "parallel: 8\n").unwrap();
        let cfg = load_engine_settings(dir.path(), None).unwrap();
        assert_eq!(cfg.parallel, 8);
    }

    #[test]
    fn profile_yaml_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("application.yaml"), "parallel: 8\n").unwrap();
        std::fs::write(dir.path().join("application-prod.yaml"), "parallel: 16\n").unwrap();
        let cfg = load_engine_settings(dir.path(), Some("prod")).unwrap();
        assert_eq!(cfg.parallel, 16);
    }

    #[test]
    fn rejects_zero_parallelism() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("application.yaml"), "parallel: 0\n").unwrap();
        assert!(load_engine_settings(dir.path(), None).is_err());
    }
}
