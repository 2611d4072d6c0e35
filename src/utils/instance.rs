//! 单实例守卫模块
//!
//! Windows 上使用命名互斥量，其他平台使用带进程号的锁文件。
//! 守卫在进程生命周期内持有，析构时释放。

use log::{info, warn};
use thiserror::Error;

/// 单实例检查错误
#[derive(Debug, Error)]
pub enum InstanceError {
    /// 已有实例在运行
    #[error("应用程序已经在运行")]
    AlreadyRunning,
    /// 无法创建互斥量或锁文件
    #[error("无法创建单实例锁: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(windows)]
pub use self::windows::InstanceGuard;

#[cfg(not(windows))]
pub use self::lockfile::InstanceGuard;

#[cfg(windows)]
mod windows {
    use super::*;
    use winapi::shared::winerror::ERROR_ALREADY_EXISTS;
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::synchapi::{CreateMutexW, ReleaseMutex};
    use winapi::um::winnt::HANDLE;

    /// 命名互斥量守卫
    #[derive(Debug)]
    pub struct InstanceGuard {
        handle: HANDLE,
    }

    impl InstanceGuard {
        /// 获取名为 `name` 的全局互斥量
        pub fn acquire(name: &str) -> Result<Self, InstanceError> {
            let wide: Vec<u16> = format!("Local\\{}", name)
                .encode_utf16()
                .chain(std::iter::once(0))
                .collect();

            let handle = unsafe { CreateMutexW(std::ptr::null_mut(), 1, wide.as_ptr()) };
            if handle.is_null() {
                return Err(InstanceError::Io(std::io::Error::last_os_error()));
            }

            if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
                unsafe { CloseHandle(handle) };
                warn!("检测到已有实例: {}", name);
                return Err(InstanceError::AlreadyRunning);
            }

            info!("已获取单实例互斥量: {}", name);
            Ok(Self { handle })
        }
    }

    impl Drop for InstanceGuard {
        fn drop(&mut self) {
            unsafe {
                ReleaseMutex(self.handle);
                CloseHandle(self.handle);
            }
        }
    }

}

#[cfg(not(windows))]
mod lockfile {
    use super::*;
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    /// 空锁文件在这段时间内视为仍被持有
    const EMPTY_LOCK_GRACE: Duration = Duration::from_secs(10);

    /// 锁文件守卫
    #[derive(Debug)]
    pub struct InstanceGuard {
        path: PathBuf,
    }

    impl InstanceGuard {
        /// 在运行时目录下获取名为 `name` 的锁
        pub fn acquire(name: &str) -> Result<Self, InstanceError> {
            let dir = dirs::runtime_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(std::env::temp_dir);
            Self::acquire_in(&dir, name)
        }

        /// 在指定目录下获取锁
        ///
        /// 进程号先写入同目录下的临时文件，再硬链接为锁文件，
        /// 锁文件一出现就带有完整内容。持有者已退出的锁视为失效并被接管。
        pub fn acquire_in(dir: &Path, name: &str) -> Result<Self, InstanceError> {
            fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.lock", name));
            let pid = std::process::id();
            let staging = dir.join(format!("{}.{}.tmp", name, pid));

            fs::write(&staging, pid.to_string())?;
            let linked = Self::link_lock(&staging, &path);
            if let Err(e) = fs::remove_file(&staging) {
                warn!("删除临时锁文件失败: {}", e);
            }
            linked?;

            info!("已获取单实例锁: {:?}", path);
            Ok(Self { path })
        }

        fn link_lock(staging: &Path, path: &Path) -> Result<(), InstanceError> {
            for _ in 0..2 {
                match fs::hard_link(staging, path) {
                    Ok(()) => return Ok(()),
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        if Self::holder_alive(path) {
                            warn!("检测到已有实例，锁文件: {:?}", path);
                            return Err(InstanceError::AlreadyRunning);
                        }
                        warn!("清理失效的锁文件: {:?}", path);
                        match fs::remove_file(path) {
                            Ok(()) => {}
                            Err(e) if e.kind() == ErrorKind::NotFound => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Err(InstanceError::AlreadyRunning)
        }

        fn holder_alive(path: &Path) -> bool {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => return false,
                Err(_) => return true,
            };

            let content = content.trim();
            if content.is_empty() {
                // 其他版本可能先建文件后写进程号
                return Self::recently_modified(path);
            }

            let pid = match content.parse::<u32>() {
                Ok(pid) => pid,
                Err(_) => return false,
            };

            if pid == std::process::id() {
                return true;
            }

            if cfg!(target_os = "linux") {
                Path::new("/proc").join(pid.to_string()).exists()
            } else {
                // 无法探测其他进程时保守地认为仍在运行
                true
            }
        }

        fn recently_modified(path: &Path) -> bool {
            fs::metadata(path)
                .and_then(|metadata| metadata.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .map_or(true, |age| age < EMPTY_LOCK_GRACE)
        }
    }

    impl Drop for InstanceGuard {
        fn drop(&mut self) {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("删除锁文件失败: {}", e);
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::time::SystemTime;
        use tempfile::tempdir;

        #[test]
        fn test_second_acquire_fails_until_released() {
            let dir = tempdir().unwrap();

            let guard = InstanceGuard::acquire_in(dir.path(), "timer").unwrap();
            assert!(matches!(
                InstanceGuard::acquire_in(dir.path(), "timer"),
                Err(InstanceError::AlreadyRunning)
            ));

            drop(guard);
            assert!(!dir.path().join("timer.lock").exists());
            assert!(InstanceGuard::acquire_in(dir.path(), "timer").is_ok());
        }

        #[test]
        fn test_lock_file_has_pid_and_no_staging_file_left() {
            let dir = tempdir().unwrap();

            let guard = InstanceGuard::acquire_in(dir.path(), "timer").unwrap();
            let content = fs::read_to_string(dir.path().join("timer.lock")).unwrap();
            assert_eq!(content, std::process::id().to_string());

            let entries: Vec<_> = fs::read_dir(dir.path())
                .unwrap()
                .map(|entry| entry.unwrap().file_name())
                .collect();
            assert_eq!(entries, vec![std::ffi::OsString::from("timer.lock")]);

            // 被拒绝的获取也不留下临时文件
            assert!(InstanceGuard::acquire_in(dir.path(), "timer").is_err());
            assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
            drop(guard);
        }

        #[test]
        fn test_empty_lock_file_is_held() {
            let dir = tempdir().unwrap();
            let guard = InstanceGuard::acquire_in(dir.path(), "timer").unwrap();

            // 锁文件刚创建、进程号尚未写入时的磁盘状态
            fs::write(dir.path().join("timer.lock"), "").unwrap();

            assert!(matches!(
                InstanceGuard::acquire_in(dir.path(), "timer"),
                Err(InstanceError::AlreadyRunning)
            ));
            drop(guard);
        }

        #[test]
        fn test_old_empty_lock_file_is_taken_over() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("timer.lock");
            fs::write(&path, "").unwrap();
            fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(SystemTime::now() - Duration::from_secs(60))
                .unwrap();

            assert!(InstanceGuard::acquire_in(dir.path(), "timer").is_ok());
        }

        #[test]
        fn test_garbage_lock_file_is_taken_over() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("timer.lock"), "not-a-pid").unwrap();

            let guard = InstanceGuard::acquire_in(dir.path(), "timer").unwrap();
            let content = fs::read_to_string(dir.path().join("timer.lock")).unwrap();
            assert_eq!(content, std::process::id().to_string());
            drop(guard);
        }

        #[cfg(target_os = "linux")]
        #[test]
        fn test_stale_lock_file_is_taken_over() {
            let dir = tempdir().unwrap();
            // 进程号上限之外，不可能存在
            fs::write(dir.path().join("timer.lock"), "4294967").unwrap();

            assert!(InstanceGuard::acquire_in(dir.path(), "timer").is_ok());
        }
    }
}
