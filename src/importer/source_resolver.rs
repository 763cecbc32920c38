// ==========================================
// 能源数据集市 - 数据源解析器
// ==========================================
// 职责: 将数据源模式匹配到落地目录中的文件
// 匹配: 文件名包含模式（大小写不敏感子串）
// 并列: 修改时间最新者胜出；修改时间相同时取文件名字典序最小者
// ==========================================

use crate::domain::source::SourceSpec;
use crate::error::{EtlError, EtlResult};
use crate::importer::file_parser::is_supported;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

// ==========================================
// ResolvedSource - 已解析的数据源
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub source_name: String,
    pub path: PathBuf,
    pub file_name: String,
    pub modified: Option<DateTime<Utc>>,
    pub size: u64,
    pub candidates: usize, // 匹配到的候选文件数
}

// ==========================================
// Resolution - 解析结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub resolved: BTreeMap<String, ResolvedSource>, // 数据源名称 → 文件
    pub skipped: Vec<String>,                       // 缺失的可选数据源
}

#[derive(Debug, Clone)]
struct LandingFile {
    path: PathBuf,
    file_name: String,
    lowered: String,
    modified: SystemTime,
    size: u64,
}

// ==========================================
// SourceResolver
// ==========================================
pub struct SourceResolver {
    landing_dir: PathBuf,
}

impl SourceResolver {
    pub fn new(landing_dir: impl Into<PathBuf>) -> Self {
        Self {
            landing_dir: landing_dir.into(),
        }
    }

    pub fn landing_dir(&self) -> &Path {
        &self.landing_dir
    }

    /// 列出落地目录中可解析的文件（跳过隐藏文件与 Office 锁文件）
    fn scan(&self) -> EtlResult<Vec<LandingFile>> {
        if !self.landing_dir.is_dir() {
            warn!(dir = %self.landing_dir.display(), "落地目录不存在，视为空目录");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.landing_dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') || file_name.starts_with("~$") {
                continue;
            }
            let path = entry.path();
            if !is_supported(&path) {
                continue;
            }
            files.push(LandingFile {
                lowered: file_name.to_lowercase(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: metadata.len(),
                path,
                file_name,
            });
        }
        Ok(files)
    }

    /// 为每个数据源选定至多一个文件
    ///
    /// # 错误
    /// - SourceNotFound: 必需数据源无匹配文件
    pub fn resolve(&self, sources: &[SourceSpec]) -> EtlResult<Resolution> {
        let files = self.scan()?;
        let mut resolution = Resolution::default();

        for spec in sources {
            match Self::pick(spec, &files) {
                Some(source) => {
                    info!(
                        source = %spec.name,
                        file = %source.file_name,
                        candidates = source.candidates,
                        "数据源已解析"
                    );
                    resolution.resolved.insert(spec.name.clone(), source);
                }
                None if spec.required => {
                    return Err(EtlError::SourceNotFound(spec.name.clone()));
                }
                None => {
                    info!(source = %spec.name, pattern = %spec.pattern, "可选数据源缺失，跳过");
                    resolution.skipped.push(spec.name.clone());
                }
            }
        }

        Ok(resolution)
    }

    /// 只检查匹配情况，不因必需数据源缺失而失败（用于 check-sources）
    pub fn inspect(&self, sources: &[SourceSpec]) -> EtlResult<Vec<(SourceSpec, Option<ResolvedSource>)>> {
        let files = self.scan()?;
        Ok(sources
            .iter()
            .map(|spec| (spec.clone(), Self::pick(spec, &files)))
            .collect())
    }

    fn pick(spec: &SourceSpec, files: &[LandingFile]) -> Option<ResolvedSource> {
        let needle = spec.pattern.to_lowercase();
        let mut candidates: Vec<&LandingFile> =
            files.iter().filter(|f| f.lowered.contains(&needle)).collect();

        // 修改时间降序，文件名升序
        candidates.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });

        if candidates.len() > 1 {
            debug!(
                source = %spec.name,
                candidates = ?candidates.iter().map(|f| f.file_name.as_str()).collect::<Vec<_>>(),
                "多个文件匹配，按修改时间选择"
            );
        }

        candidates.first().map(|file| ResolvedSource {
            source_name: spec.name.clone(),
            path: file.path.clone(),
            file_name: file.file_name.clone(),
            modified: Some(DateTime::<Utc>::from(file.modified)),
            size: file.size,
            candidates: candidates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::{SheetSelector, SheetSpec};
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn spec(name: &str, pattern: &str, required: bool) -> SourceSpec {
        SourceSpec {
            name: name.to_string(),
            pattern: pattern.to_string(),
            required,
            sheets: vec![SheetSpec {
                logical_name: "t".into(),
                selector: SheetSelector::Index(0),
                table: "t".into(),
                header_keywords: Vec::new(),
                unpivot: None,
            }],
        }
    }

    fn touch(dir: &TempDir, name: &str, modified: SystemTime) {
        let path = dir.path().join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(modified).unwrap();
    }

    #[test]
    fn test_case_insensitive_substring_match() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "Reporte_FACTURACION_2025.xlsx", SystemTime::now());
        touch(&dir, "notas.txt", SystemTime::now());
        touch(&dir, "~$facturacion.xlsx", SystemTime::now());

        let resolver = SourceResolver::new(dir.path());
        let resolution = resolver
            .resolve(&[spec("facturacion", "Facturacion", true)])
            .unwrap();
        let source = &resolution.resolved["facturacion"];
        assert_eq!(source.file_name, "Reporte_FACTURACION_2025.xlsx");
        assert_eq!(source.candidates, 1);
    }

    #[test]
    fn test_newest_file_wins_then_name() {
        let dir = TempDir::new().unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        touch(&dir, "ventas_enero.csv", base);
        touch(&dir, "ventas_febrero.csv", base + Duration::from_secs(60));
        touch(&dir, "ventas_b.csv", base + Duration::from_secs(120));
        touch(&dir, "ventas_a.csv", base + Duration::from_secs(120));

        let resolver = SourceResolver::new(dir.path());
        let resolution = resolver.resolve(&[spec("ventas", "ventas", true)]).unwrap();
        let source = &resolution.resolved["ventas"];
        assert_eq!(source.file_name, "ventas_a.csv");
        assert_eq!(source.candidates, 4);
    }

    #[test]
    fn test_required_missing_and_optional_skipped() {
        let dir = TempDir::new().unwrap();
        let resolver = SourceResolver::new(dir.path());

        let resolution = resolver
            .resolve(&[spec("hidrologia", "caudales", false)])
            .unwrap();
        assert!(resolution.resolved.is_empty());
        assert_eq!(resolution.skipped, vec!["hidrologia"]);

        let err = resolver
            .resolve(&[spec("facturacion", "facturacion", true)])
            .unwrap_err();
        assert!(matches!(err, EtlError::SourceNotFound(name) if name == "facturacion"));
    }

    #[test]
    fn test_missing_landing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let resolver = SourceResolver::new(dir.path().join("no_existe"));
        let resolution = resolver.resolve(&[spec("x", "x", false)]).unwrap();
        assert_eq!(resolution.skipped, vec!["x"]);
    }
}
