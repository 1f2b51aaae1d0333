use crate::transformer::{Mode, ObjectToNode, RolesDedup, Transforms};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `uastx.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct UastConfig {
    /// Namespace prefixed to untagged types in semantic mode
    pub namespace: Option<String>,
    /// Pipeline mode used when none is given on the command line
    pub mode: Mode,
    /// Remove repeated roles after annotation
    pub dedup_roles: bool,
    /// How the native parser output is shaped
    pub native: ObjectToNode,
}

impl UastConfig {
    /// A starting point for a new driver
    pub fn example() -> Self {
        Self {
            namespace: Some("lang".to_string()),
            mode: Mode::Semantic,
            dedup_roles: true,
            native: ObjectToNode {
                internal_type_key: Some("type".to_string()),
                offset_key: Some("start".to_string()),
                end_offset_key: Some("end".to_string()),
                top_level_is_root_node: false,
            },
        }
    }

    pub fn object_to_node(&self) -> ObjectToNode {
        self.native.clone()
    }

    /// The pipeline described by this configuration.
    pub fn transforms(&self) -> Transforms {
        let mut t = Transforms::new().preprocess(self.object_to_node());
        if self.dedup_roles {
            t = t.annotate(RolesDedup);
        }
        if let Some(ns) = &self.namespace {
            t = t.namespace(ns.clone());
        }
        t
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("uastx.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<UastConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: UastConfig = toml::from_str(&contents)?;
    tracing::debug!("loaded config from {}", path.display());
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &UastConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arr_node, obj_node};

    #[test]
    fn test_parse_config() {
        let config: UastConfig = toml::from_str(
            r#"
namespace = "python"
mode = "annotated"
dedup_roles = true

[native]
internal_type_key = "ast_type"
top_level_is_root_node = true
"#,
        )
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("python"));
        assert_eq!(config.mode, Mode::Annotated);
        assert_eq!(config.native.internal_type_key.as_deref(), Some("ast_type"));
        assert!(config.native.offset_key.is_none());
        assert!(config.native.top_level_is_root_node);
    }

    #[test]
    fn test_empty_config_defaults() {
        let config: UastConfig = toml::from_str("").unwrap();
        assert_eq!(config, UastConfig::default());
        assert_eq!(config.mode, Mode::Semantic);
    }

    #[test]
    fn test_example_roundtrips_through_toml() {
        let config = UastConfig::example();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: UastConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uastx.toml");

        write_config(&path, &UastConfig::example(), false).unwrap();
        assert!(write_config(&path, &UastConfig::example(), false).is_err());
        write_config(&path, &UastConfig::default(), true).unwrap();

        let loaded = load_config(Some(path.as_path())).unwrap();
        assert_eq!(loaded, Some(UastConfig::default()));
        assert_eq!(load_config(Some(dir.path().join("missing.toml").as_path())).unwrap(), None);
    }

    #[test]
    fn test_transforms_from_config() {
        let config = UastConfig {
            namespace: Some("py".into()),
            dedup_roles: true,
            native: ObjectToNode {
                internal_type_key: Some("kind".into()),
                top_level_is_root_node: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let inp = arr_node![obj_node! { "kind" => "Name", "@role" => arr_node!["A", "A"] }];
        let out = config.transforms().run(Mode::Semantic, &inp).unwrap();
        assert_eq!(out, arr_node![obj_node! { "@type" => "py:Name", "@role" => arr_node!["A"] }]);

        let pre = config.transforms().run(Mode::Preprocessed, &inp).unwrap();
        assert_eq!(pre, arr_node![obj_node! { "@type" => "Name", "@role" => arr_node!["A", "A"] }]);
        assert!(config.object_to_node().mapping().is_some());
    }
}
