// ==========================================
// 合并原子性与并发控制测试
// ==========================================
// 测试目标: 写入失败时集市表保持运行前字节；锁超时有界且可重试
// ==========================================

mod test_helpers;

use energy_mart_etl::domain::{MartTable, RunStatus, TableRunStatus};
use energy_mart_etl::engine::{EtlOrchestrator, MartPipeline};
use energy_mart_etl::error::{EtlError, EtlResult};
use energy_mart_etl::logging;
use energy_mart_etl::repository::{atomic_write, CsvMartRepository, MartLock, MartStore};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;

/// 写到一半失败的集市存储
struct FailingStore {
    inner: CsvMartRepository,
}

impl MartStore for FailingStore {
    fn load(&self, table: &str, key_columns: &[String]) -> EtlResult<MartTable> {
        self.inner.load(table, key_columns)
    }

    fn replace(&self, mart: &MartTable) -> EtlResult<()> {
        atomic_write(&self.table_path(&mart.name), |out| {
            out.write_all(b"cliente,periodo,mwh\nA,2025")?;
            Err(io::Error::new(io::ErrorKind::Other, "disco lleno"))
        })
        .map_err(|e| EtlError::WriteFailure {
            table: mart.name.clone(),
            message: e.to_string(),
        })
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.inner.table_path(table)
    }
}

#[tokio::test]
async fn test_write_failure_leaves_mart_byte_identical() {
    logging::init_test();
    let ws = Workspace::new();

    ws.write_landing("facturacion.csv", "cliente,periodo,mwh\nA,202501,10\n");
    let healthy = EtlOrchestrator::new(ws.config(VENTAS_CONFIG));
    assert!(healthy.run(&strict_ctx()).await.is_success());
    let before = ws.mart_bytes(VENTAS_TABLE);

    ws.write_landing("facturacion.csv", "cliente,periodo,mwh\nB,202501,7\n");
    let store = Arc::new(FailingStore {
        inner: CsvMartRepository::new(ws.output()),
    });
    let failing = EtlOrchestrator::with_store(ws.config(VENTAS_CONFIG), store);
    let outcome = failing.run(&non_strict_ctx()).await;

    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(outcome.error, Some(EtlError::WriteFailure { .. })));
    assert_eq!(outcome.record.status, RunStatus::Failed);
    assert_eq!(
        outcome.record.table(VENTAS_TABLE).unwrap().status,
        TableRunStatus::Failed
    );
    assert_eq!(ws.mart_bytes(VENTAS_TABLE), before);

    // 无残留临时文件，锁已释放
    let leftovers: Vec<String> = fs::read_dir(ws.output())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
    assert!(!MartLock::lock_path(&ws.output(), VENTAS_TABLE).exists());
}

#[tokio::test]
async fn test_lock_timeout_fails_run_with_retryable_error() {
    logging::init_test();
    let ws = Workspace::new();
    let config = ws.config(&format!("runtime:\n  lock_timeout_secs: 1\n{}", VENTAS_CONFIG));
    let orchestrator = EtlOrchestrator::new(config);
    ws.write_landing("facturacion.csv", "cliente,periodo,mwh\nA,202501,10\n");

    // 另一运行持有锁
    let held = MartLock::acquire(&ws.output(), VENTAS_TABLE, "otra-corrida", Duration::from_secs(1))
        .await
        .unwrap();

    let outcome = orchestrator.run(&strict_ctx()).await;
    assert_eq!(outcome.exit_code(), 3);
    let err = outcome.error.as_ref().unwrap();
    assert!(err.is_retryable());
    match err {
        EtlError::LockTimeout { table, .. } => assert_eq!(table, VENTAS_TABLE),
        other => panic!("expected lock timeout, got {:?}", other),
    }
    assert!(!ws.mart_path(VENTAS_TABLE).exists());

    // 释放后重试成功
    drop(held);
    let retry = orchestrator.run(&strict_ctx()).await;
    assert!(retry.is_success(), "{:?}", retry.error);
    assert_eq!(ws.load_mart(VENTAS_TABLE, &["cliente", "periodo"]).len(), 1);
}
