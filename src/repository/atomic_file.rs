// ==========================================
// 能源数据集市 - 原子文件写入
// ==========================================
// 流程: 同目录临时文件 → 写入 → flush + fsync → rename 覆盖目标
// 约束: 任一步骤失败时删除临时文件，目标文件保持原样
// ==========================================

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn temp_path_for(target: &Path) -> io::Result<PathBuf> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let file_name = target
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "目标路径缺少文件名"))?
        .to_string_lossy();
    let suffix = Uuid::new_v4().simple().to_string();
    Ok(dir.join(format!(".{}.{}.tmp", file_name, &suffix[..8])))
}

/// 原子替换写入
///
/// # 参数
/// - target: 目标文件
/// - write: 写入内容的回调（写入临时文件）
pub fn atomic_write<F>(target: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let temp = temp_path_for(target)?;
    let result = (|| {
        let file = OpenOptions::new().write(true).create_new(true).open(&temp)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, target)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("ventas.csv");
        fs::write(&target, "old").unwrap();

        atomic_write(&target, |w| w.write_all(b"new")).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_write_leaves_target_and_no_temp() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("ventas.csv");
        fs::write(&target, "old").unwrap();

        let result = atomic_write(&target, |w| {
            w.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "disco lleno"))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
