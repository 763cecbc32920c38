// ==========================================
// ConfigManager 集成测试
// ==========================================
// 测试目标: 配置定位 / 加载 / 覆写 / 目录创建 / 错误路径
// ==========================================

mod test_helpers;

use energy_mart_etl::config::{ConfigManager, DEFAULT_CONFIG_CANDIDATES};
use energy_mart_etl::domain::SheetSelector;
use energy_mart_etl::EtlError;
use std::fs;
use std::path::PathBuf;
use test_helpers::{Workspace, VENTAS_CONFIG, VENTAS_TABLE};

#[test]
fn test_locate_default_candidates_in_order() {
    let ws = Workspace::new();
    fs::write(ws.root().join("config.toml"), "").unwrap();
    fs::write(ws.root().join("config.yaml"), "").unwrap();

    let found = ConfigManager::locate(None, ws.root()).unwrap();
    assert_eq!(found, ws.root().join("config.yaml"));
    assert_eq!(DEFAULT_CONFIG_CANDIDATES[0], "config.yml");
}

#[test]
fn test_locate_missing_config_is_config_error() {
    let ws = Workspace::new();
    let err = ConfigManager::locate(None, ws.root()).unwrap_err();
    assert!(matches!(err, EtlError::Config { .. }));
    assert_eq!(err.exit_code(), 2);

    let err = ConfigManager::locate(Some(ws.root().join("nope.yml").as_path()), ws.root()).unwrap_err();
    assert!(matches!(err, EtlError::Config { .. }));
}

#[test]
fn test_load_resolves_paths_relative_to_config_file() {
    let ws = Workspace::new();
    let config = ws.config(VENTAS_CONFIG);

    assert_eq!(config.paths.input, ws.root().join("data_landing"));
    assert_eq!(config.paths.output, ws.root().join("data_mart"));
    assert_eq!(config.paths.reports, ws.root().join("reports"));
    assert_eq!(config.paths.ledger_path(), ws.root().join("logs").join("etl_runs.jsonl"));
    assert_eq!(config.paths.metadata_path(), ws.root().join("data_mart").join("metadata.json"));
    assert!(config.paths.all().iter().all(|p| p.is_dir()));

    let source = config.source("facturacion").unwrap();
    assert_eq!(source.sheets[0].selector, SheetSelector::Index(0));
    assert_eq!(config.table_rule(VENTAS_TABLE).unwrap().key_columns, vec!["cliente", "periodo"]);
    assert_eq!(config.runtime.lock_timeout_secs, 30);
    assert!(config.runtime.parallel_extraction);
}

#[test]
fn test_load_toml_with_runtime_section() {
    let ws = Workspace::new();
    let path = ws.root().join("config.toml");
    fs::write(
        &path,
        r#"
[paths]
input = "entrada"

[runtime]
parallel_extraction = false
header_scan_rows = 5

[sources.facturacion]
pattern = "facturacion"
required = true

[sources.facturacion.sheets]
ventas_mensual_mwh = ["ENERO", "FEBRERO"]

[tables.ventas_mensual_mwh]
required_columns = ["cliente", "periodo"]
key_columns = ["cliente", "periodo"]
"#,
    )
    .unwrap();

    let config = ConfigManager::load(&path).unwrap();
    assert_eq!(config.paths.input, ws.root().join("entrada"));
    assert!(!config.runtime.parallel_extraction);
    assert_eq!(config.runtime.header_scan_rows, 5);
    assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
    assert_eq!(
        config.source("facturacion").unwrap().sheets[0].selector,
        SheetSelector::Names(vec!["ENERO".to_string(), "FEBRERO".to_string()])
    );
}

#[test]
fn test_cli_overrides_replace_paths() {
    let ws = Workspace::new();
    let mut config = ws.config(VENTAS_CONFIG);
    ConfigManager::apply_overrides(
        &mut config,
        Some(PathBuf::from("/tmp/landing")),
        None,
    );
    assert_eq!(config.paths.input, PathBuf::from("/tmp/landing"));
    assert_eq!(config.paths.output, ws.root().join("data_mart"));
}

#[test]
fn test_key_column_must_be_declared() {
    let ws = Workspace::new();
    let path = ws.root().join("config.yml");
    fs::write(
        &path,
        r#"
tables:
  ventas_mensual_mwh:
    required_columns: [cliente]
    key_columns: [cliente, periodo]
"#,
    )
    .unwrap();

    match ConfigManager::load(&path) {
        Err(EtlError::Config { path, .. }) => {
            assert_eq!(path, "tables.ventas_mensual_mwh.key_columns")
        }
        other => panic!("expected config error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_unknown_extension_is_rejected() {
    let ws = Workspace::new();
    let path = ws.root().join("config.ini");
    fs::write(&path, "x=1").unwrap();
    assert!(matches!(
        ConfigManager::load(&path),
        Err(EtlError::Config { .. })
    ));
}

#[test]
fn test_example_config_is_valid() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.example.yml");
    let config = ConfigManager::load(&path).unwrap();

    assert_eq!(config.tables.len(), 4);
    assert_eq!(
        config.sources_for_table("facturacion_mensual"),
        vec!["facturacion"]
    );
    let hidrologia = config.source("hidrologia").unwrap();
    assert!(!hidrologia.required);

    let facturacion = config.source("facturacion").unwrap();
    let unpivot = facturacion
        .sheets
        .iter()
        .find_map(|s| s.unpivot.as_ref())
        .unwrap();
    assert_eq!(unpivot.year, Some(2025));
}
