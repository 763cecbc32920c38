// ==========================================
// 能源数据集市 - 集市表合并锁
// ==========================================
// 机制: 咨询锁文件 <output>/.locks/<table>.lock（create_new 独占创建）
// 约束: 有界等待，超时返回 LockTimeout；离开作用域（含错误路径）自动释放
// 说明: 进程崩溃残留的锁文件需人工删除（超时错误中给出锁文件路径）
// ==========================================

use crate::error::{EtlError, EtlResult};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const LOCK_DIR_NAME: &str = ".locks";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ==========================================
// MartLock - 单表合并锁（RAII）
// ==========================================
#[derive(Debug)]
pub struct MartLock {
    table: String,
    path: PathBuf,
}

impl MartLock {
    pub fn lock_path(output_dir: &Path, table: &str) -> PathBuf {
        output_dir
            .join(LOCK_DIR_NAME)
            .join(format!("{}.lock", table))
    }

    /// 获取表锁（轮询等待，最长 timeout）
    pub async fn acquire(
        output_dir: &Path,
        table: &str,
        run_id: &str,
        timeout: Duration,
    ) -> EtlResult<Self> {
        let path = Self::lock_path(output_dir, table);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| EtlError::WriteFailure {
                table: table.to_string(),
                message: format!("创建锁目录失败: {}", e),
            })?;
        }

        let start = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // 锁内容仅用于排查
                    let _ = writeln!(
                        file,
                        "run_id={} pid={} acquired_at={}",
                        run_id,
                        std::process::id(),
                        Utc::now().to_rfc3339()
                    );
                    debug!(table = %table, lock = %path.display(), "合并锁已获取");
                    return Ok(Self {
                        table: table.to_string(),
                        path,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        warn!(table = %table, lock = %path.display(), "合并锁等待超时");
                        return Err(EtlError::LockTimeout {
                            table: table.to_string(),
                            waited_ms: waited.as_millis() as u64,
                            lock_path: path,
                        });
                    }
                    tokio::time::sleep(POLL_INTERVAL.min(timeout - waited)).await;
                }
                Err(e) => {
                    return Err(EtlError::WriteFailure {
                        table: table.to_string(),
                        message: format!("创建锁文件失败: {}", e),
                    });
                }
            }
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MartLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(table = %self.table, "合并锁已释放"),
            Err(e) => warn!(table = %self.table, error = %e, "合并锁释放失败"),
        }
    }
}
