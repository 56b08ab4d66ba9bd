//! Who we are running for and where our files live.
//!
//! Built once at startup and passed to whatever needs it.

use crate::error::{HostprepError, Result};
use std::env;
use std::ffi::{CStr, CString};
use std::fs;
use std::os::unix::fs::chown;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOG_DIR_NAME: &str = "hostprep_logs";
const BACKUP_DIR_NAME: &str = "hostprep_backups";
const STATE_FILE_NAME: &str = "installation_state.json";
const ROLLBACK_FILE_NAME: &str = "rollback_manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// The user who invoked sudo, not root
    pub real_user: String,
    pub home: PathBuf,
    pub uid: u32,
    pub gid: u32,
    pub log_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub state_file: PathBuf,
    pub rollback_file: PathBuf,
}

struct Account {
    home: PathBuf,
    uid: u32,
    gid: u32,
}

impl Environment {
    /// Resolve the invoking user and derive every path from their home.
    /// `state_dir` replaces the default log directory when set.
    pub fn detect(state_dir: Option<&Path>) -> Self {
        let real_user = env::var("SUDO_USER")
            .ok()
            .filter(|u| !u.is_empty())
            .or_else(|| env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string());

        // SAFETY: getuid/getgid cannot fail
        let (fallback_uid, fallback_gid) = unsafe { (libc::getuid(), libc::getgid()) };
        let account = lookup_account(&real_user).unwrap_or_else(|| Account {
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root")),
            uid: fallback_uid,
            gid: fallback_gid,
        });

        Self::for_user(real_user, account.home, account.uid, account.gid, state_dir)
    }

    pub fn for_user(
        real_user: String,
        home: PathBuf,
        uid: u32,
        gid: u32,
        state_dir: Option<&Path>,
    ) -> Self {
        let log_dir = state_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| home.join(LOG_DIR_NAME));
        Self {
            real_user,
            backup_dir: home.join(BACKUP_DIR_NAME),
            state_file: log_dir.join(STATE_FILE_NAME),
            rollback_file: log_dir.join(ROLLBACK_FILE_NAME),
            log_dir,
            home,
            uid,
            gid,
        }
    }

    /// Create the log and backup directories, owned by the real user
    pub fn prepare_dirs(&self) -> Result<()> {
        for dir in [&self.log_dir, &self.backup_dir] {
            fs::create_dir_all(dir)?;
            self.hand_over(dir);
        }
        Ok(())
    }

    /// Give a file we created as root back to the real user. Best effort.
    pub fn hand_over(&self, path: &Path) {
        if let Err(err) = chown(path, Some(self.uid), Some(self.gid)) {
            warn!("Could not set ownership on {}: {}", path.display(), err);
        }
    }

    pub fn log_file(&self, stamp: &str) -> PathBuf {
        self.log_dir.join(format!("hostprep_{}.log", stamp))
    }
}

/// Fail unless the effective user is root
pub fn require_root() -> Result<()> {
    // SAFETY: geteuid cannot fail
    if unsafe { libc::geteuid() } != 0 {
        let program = env::args().next().unwrap_or_else(|| "hostprep".to_string());
        return Err(HostprepError::Privilege(program));
    }
    Ok(())
}

fn lookup_account(user: &str) -> Option<Account> {
    let name = CString::new(user).ok()?;
    // SAFETY: getpwnam returns a pointer into static storage or null; we copy
    // out what we need before any other passwd call can overwrite it
    unsafe {
        let pw = libc::getpwnam(name.as_ptr());
        if pw.is_null() {
            debug!("No passwd entry for {}", user);
            return None;
        }
        let home = CStr::from_ptr((*pw).pw_dir).to_string_lossy().into_owned();
        Some(Account {
            home: PathBuf::from(home),
            uid: (*pw).pw_uid,
            gid: (*pw).pw_gid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_home() {
        let env = Environment::for_user("gamer".into(), PathBuf::from("/home/gamer"), 1000, 1000, None);
        assert_eq!(env.log_dir, PathBuf::from("/home/gamer/hostprep_logs"));
        assert_eq!(
            env.state_file,
            PathBuf::from("/home/gamer/hostprep_logs/installation_state.json")
        );
        assert_eq!(env.backup_dir, PathBuf::from("/home/gamer/hostprep_backups"));
    }

    #[test]
    fn state_dir_overrides_log_dir() {
        let env = Environment::for_user(
            "gamer".into(),
            PathBuf::from("/home/gamer"),
            1000,
            1000,
            Some(Path::new("/var/lib/hostprep")),
        );
        assert_eq!(env.rollback_file, PathBuf::from("/var/lib/hostprep/rollback_manifest.json"));
        assert_eq!(env.log_file("20260101_120000"), PathBuf::from("/var/lib/hostprep/hostprep_20260101_120000.log"));
    }

    #[test]
    fn root_has_a_passwd_entry() {
        let account = lookup_account("root").expect("root account");
        assert_eq!(account.uid, 0);
    }
}
