use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use baloneo_core::annotation::{DEFAULT_BALLOON_DIAMETER, Unit};
use baloneo_core::geometry::DEFAULT_RENDER_ZOOM;
use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "BALONEO_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `BALONEO_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.render.zoom.is_finite() && self.render.zoom > 0.0) {
            return Err(format!("render.zoom 必须为正数，当前为 {}", self.render.zoom));
        }
        if !(self.render.balloon_diameter.is_finite() && self.render.balloon_diameter > 0.0) {
            return Err(format!(
                "render.balloon_diameter 必须为正数，当前为 {}",
                self.render.balloon_diameter
            ));
        }
        Ok(())
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 页面渲染缩放与气球尺寸（渲染像素）。
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "RenderConfig::default_zoom")]
    pub zoom: f64,
    #[serde(default = "RenderConfig::default_balloon_diameter")]
    pub balloon_diameter: f64,
}

impl RenderConfig {
    fn default_zoom() -> f64 {
        DEFAULT_RENDER_ZOOM
    }

    fn default_balloon_diameter() -> f64 {
        DEFAULT_BALLOON_DIAMETER
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            zoom: Self::default_zoom(),
            balloon_diameter: Self::default_balloon_diameter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub default_unit: Unit,
    #[serde(default = "ExportConfig::default_suffix")]
    pub suffix: String,
}

impl ExportConfig {
    fn default_suffix() -> String {
        "_baloneado".to_string()
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_unit: Unit::default(),
            suffix: Self::default_suffix(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置文件 {path:?} 无效: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "{text}").unwrap();
        file
    }

    #[test]
    fn defaults_match_interactive_settings() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.render.zoom, 2.0);
        assert_eq!(cfg.render.balloon_diameter, 35.0);
        assert_eq!(cfg.export.default_unit, Unit::Mm);
        assert_eq!(cfg.export.suffix, "_baloneado");
    }

    #[test]
    fn load_from_temp_file() {
        let file = write_config(
            r#"
            [logging]
            level = "debug"

            [render]
            zoom = 3.0

            [export]
            default_unit = "in"
            suffix = "_marcado"
            "#,
        );

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.render.zoom, 3.0);
        assert_eq!(cfg.render.balloon_diameter, 35.0);
        assert_eq!(cfg.export.default_unit, Unit::In);
        assert_eq!(cfg.export.suffix, "_marcado");
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let file = write_config("[logging]\nlevel = \"warn\"");
        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.render.zoom, 2.0);
        assert_eq!(cfg.export.suffix, "_baloneado");
    }

    #[test]
    fn rejects_unknown_unit_and_bad_zoom() {
        let file = write_config("[export]\ndefault_unit = \"cm\"");
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let file = write_config("[render]\nzoom = 0.0");
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::from_file(dir.path().join("none.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
