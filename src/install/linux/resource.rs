//! Idempotent resource installation.
//!
//! `ensure` creates directories and plain files only when absent and always
//! enforces mode and owner. `install_copy` is for managed content (rendered
//! templates, static assets) and overwrites on every run.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use super::ProvisionError;
use super::file_ops::{set_mode, write_file_atomic};
use crate::install::exec::{self, CommandError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub user: String,
    pub group: String,
}

impl Owner {
    pub fn new(user: &str, group: &str) -> Self {
        Self {
            user: user.to_string(),
            group: group.to_string(),
        }
    }
}

/// A managed path and the attributes it must end up with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub path: PathBuf,
    pub kind: ResourceKind,
    pub mode: u32,
    pub owner: Option<Owner>,
}

impl ResourceSpec {
    pub fn directory(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            path: path.into(),
            kind: ResourceKind::Directory,
            mode,
            owner: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            path: path.into(),
            kind: ResourceKind::File,
            mode,
            owner: None,
        }
    }

    pub fn owned_by(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// How mutations reach the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// Plain syscalls as the invoking user. Ownership is left untouched.
    Direct,
    /// Every mutation goes through [`PrivilegedFs`]; used for system paths.
    Sudo,
}

/// File mutations that need root: one call, one external command
pub trait PrivilegedFs {
    fn make_dir(&self, path: &Path) -> Result<(), CommandError>;
    fn touch(&self, path: &Path) -> Result<(), CommandError>;
    fn chmod(&self, path: &Path, mode: u32) -> Result<(), CommandError>;
    fn chown(&self, path: &Path, owner: &Owner) -> Result<(), CommandError>;
    fn copy(&self, from: &Path, to: &Path) -> Result<(), CommandError>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), CommandError>;
}

/// `sudo mkdir/touch/chmod/chown/cp/mv`
#[derive(Debug, Default, Clone, Copy)]
pub struct SudoFs;

impl PrivilegedFs for SudoFs {
    fn make_dir(&self, path: &Path) -> Result<(), CommandError> {
        exec::sudo("mkdir", [OsStr::new("-p"), path.as_os_str()])?;
        Ok(())
    }

    fn touch(&self, path: &Path) -> Result<(), CommandError> {
        exec::sudo("touch", [path])?;
        Ok(())
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<(), CommandError> {
        let mode = format!("{mode:o}");
        exec::sudo("chmod", [OsStr::new(&mode), path.as_os_str()])?;
        Ok(())
    }

    fn chown(&self, path: &Path, owner: &Owner) -> Result<(), CommandError> {
        let owner = format!("{}:{}", owner.user, owner.group);
        exec::sudo("chown", [OsStr::new(&owner), path.as_os_str()])?;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), CommandError> {
        exec::sudo("cp", [OsStr::new("-f"), from.as_os_str(), to.as_os_str()])?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), CommandError> {
        exec::sudo("mv", [OsStr::new("-f"), from.as_os_str(), to.as_os_str()])?;
        Ok(())
    }
}

enum Mode {
    Direct,
    Privileged(Box<dyn PrivilegedFs>),
}

pub struct ResourceInstaller {
    mode: Mode,
}

impl ResourceInstaller {
    pub fn direct() -> Self {
        Self { mode: Mode::Direct }
    }

    pub fn sudo() -> Self {
        Self::privileged(Box::new(SudoFs))
    }

    /// Route every mutation through `commands`
    pub fn privileged(commands: Box<dyn PrivilegedFs>) -> Self {
        Self {
            mode: Mode::Privileged(commands),
        }
    }

    pub fn elevation(&self) -> Elevation {
        match self.mode {
            Mode::Direct => Elevation::Direct,
            Mode::Privileged(_) => Elevation::Sudo,
        }
    }

    /// Make `spec` present. Existing paths keep their content; only mode and
    /// owner are enforced.
    pub fn ensure(&self, spec: &ResourceSpec) -> Result<(), ProvisionError> {
        check_kind(spec)?;

        let present = spec.path.exists();
        if present {
            log::debug!("{} already present, enforcing attributes", spec.path.display());
        } else {
            log::info!("Creating {}", spec.path.display());
        }

        match &self.mode {
            Mode::Direct => {
                if !present {
                    create_direct(spec)?;
                }
                set_mode(&spec.path, spec.mode)?;
                if let Some(owner) = &spec.owner {
                    log::warn!(
                        "Not changing owner of {} to {}:{} without elevation",
                        spec.path.display(),
                        owner.user,
                        owner.group
                    );
                }
                Ok(())
            }
            Mode::Privileged(fs) => {
                if !present {
                    let created = match spec.kind {
                        ResourceKind::Directory => fs.make_dir(&spec.path),
                        ResourceKind::File => fs.touch(&spec.path),
                    };
                    created.map_err(|e| ProvisionError::resource(&spec.path, e))?;
                }
                apply_attributes(&**fs, &spec.path, spec)
            }
        }
    }

    /// Install `content` at `spec.path`, replacing whatever is there.
    ///
    /// With elevation the content is staged privately, copied next to the
    /// destination, given its attributes there and then moved over the
    /// destination, so the managed path only ever holds a complete file.
    pub fn install_copy(&self, spec: &ResourceSpec, content: &[u8]) -> Result<(), ProvisionError> {
        if spec.kind != ResourceKind::File {
            return Err(ProvisionError::resource(&spec.path, "managed copies must be files"));
        }
        log::info!("Installing {}", spec.path.display());

        match &self.mode {
            Mode::Direct => write_file_atomic(&spec.path, content, spec.mode),
            Mode::Privileged(fs) => {
                let staged = stage_private(&spec.path, content)?;
                let temp_dest = sibling_temp_path(&spec.path);

                fs.copy(staged.path(), &temp_dest)
                    .map_err(|e| ProvisionError::resource(&spec.path, e))?;
                apply_attributes(&**fs, &temp_dest, spec)?;
                fs.rename(&temp_dest, &spec.path)
                    .map_err(|e| ProvisionError::resource(&spec.path, e))
            }
        }
    }
}

fn check_kind(spec: &ResourceSpec) -> Result<(), ProvisionError> {
    let Ok(meta) = fs::metadata(&spec.path) else {
        return Ok(());
    };
    let matches = match spec.kind {
        ResourceKind::Directory => meta.is_dir(),
        ResourceKind::File => meta.is_file(),
    };
    if matches {
        Ok(())
    } else {
        Err(ProvisionError::resource(
            &spec.path,
            format!("exists but is not a {}", kind_name(spec.kind)),
        ))
    }
}

fn kind_name(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Directory => "directory",
        ResourceKind::File => "regular file",
    }
}

fn create_direct(spec: &ResourceSpec) -> Result<(), ProvisionError> {
    let result = match spec.kind {
        ResourceKind::Directory => fs::create_dir_all(&spec.path),
        ResourceKind::File => fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&spec.path)
            .map(|_| ()),
    };
    result.map_err(|e| ProvisionError::resource(&spec.path, e))
}

fn apply_attributes(fs: &dyn PrivilegedFs, path: &Path, spec: &ResourceSpec) -> Result<(), ProvisionError> {
    fs.chmod(path, spec.mode)
        .map_err(|e| ProvisionError::resource(&spec.path, e))?;
    if let Some(owner) = &spec.owner {
        fs.chown(path, owner)
            .map_err(|e| ProvisionError::resource(&spec.path, e))?;
    }
    Ok(())
}

/// Stage content in the invoking user's temp dir before escalating
fn stage_private(dest: &Path, content: &[u8]) -> Result<tempfile::NamedTempFile, ProvisionError> {
    use std::io::Write;

    let mut staged = tempfile::Builder::new()
        .prefix("allsky-provision-")
        .tempfile()
        .map_err(|e| ProvisionError::resource(dest, format!("Failed to create staging file: {e}")))?;
    staged
        .write_all(content)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|e| ProvisionError::resource(dest, format!("Failed to write staging file: {e}")))?;
    Ok(staged)
}

fn sibling_temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".allsky-provision.tmp");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::super::file_ops::mode_of;
    use super::*;

    /// Records each privileged command instead of running it
    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl Recorder {
        fn push(&self, call: String) -> Result<(), CommandError> {
            self.0.borrow_mut().push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.0.borrow().clone()
        }
    }

    impl PrivilegedFs for Recorder {
        fn make_dir(&self, path: &Path) -> Result<(), CommandError> {
            self.push(format!("mkdir {}", path.display()))
        }
        fn touch(&self, path: &Path) -> Result<(), CommandError> {
            self.push(format!("touch {}", path.display()))
        }
        fn chmod(&self, path: &Path, mode: u32) -> Result<(), CommandError> {
            self.push(format!("chmod {mode:o} {}", path.display()))
        }
        fn chown(&self, path: &Path, owner: &Owner) -> Result<(), CommandError> {
            self.push(format!("chown {}:{} {}", owner.user, owner.group, path.display()))
        }
        fn copy(&self, _from: &Path, to: &Path) -> Result<(), CommandError> {
            self.push(format!("cp {}", to.display()))
        }
        fn rename(&self, from: &Path, to: &Path) -> Result<(), CommandError> {
            self.push(format!("mv {} {}", from.display(), to.display()))
        }
    }

    fn recorded() -> (Recorder, ResourceInstaller) {
        let recorder = Recorder::default();
        let installer = ResourceInstaller::privileged(Box::new(recorder.clone()));
        (recorder, installer)
    }

    #[test]
    fn ensure_directory_twice_is_stable() {
        let root = tempfile::tempdir().unwrap();
        let spec = ResourceSpec::directory(root.path().join("var/lib/indi-allsky"), 0o755);
        let installer = ResourceInstaller::direct();

        installer.ensure(&spec).unwrap();
        fs::write(spec.path.join("indi-allsky.sqlite"), "data").unwrap();
        installer.ensure(&spec).unwrap();

        assert!(spec.path.is_dir());
        assert_eq!(mode_of(&spec.path).unwrap(), 0o755);
        assert_eq!(fs::read_to_string(spec.path.join("indi-allsky.sqlite")).unwrap(), "data");
    }

    #[test]
    fn ensure_enforces_mode_on_existing_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("htdocs");
        fs::create_dir(&path).unwrap();
        set_mode(&path, 0o700).unwrap();

        ResourceInstaller::direct()
            .ensure(&ResourceSpec::directory(&path, 0o755))
            .unwrap();
        assert_eq!(mode_of(&path).unwrap(), 0o755);
    }

    #[test]
    fn ensure_file_keeps_existing_log_content() {
        let root = tempfile::tempdir().unwrap();
        let log = root.path().join("indi-allsky.log");
        fs::write(&log, "2022-01-01 captured\n").unwrap();

        let spec = ResourceSpec::file(&log, 0o644).owned_by(Owner::new("syslog", "adm"));
        ResourceInstaller::direct().ensure(&spec).unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap(), "2022-01-01 captured\n");
        assert_eq!(mode_of(&log).unwrap(), 0o644);
    }

    #[test]
    fn ensure_creates_missing_file_empty() {
        let root = tempfile::tempdir().unwrap();
        let log = root.path().join("indi-allsky.log");
        ResourceInstaller::direct()
            .ensure(&ResourceSpec::file(&log, 0o644))
            .unwrap();
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("backup");
        fs::write(&path, "not a dir").unwrap();

        let err = ResourceInstaller::direct()
            .ensure(&ResourceSpec::directory(&path, 0o755))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ResourceInstallFailure { .. }));
    }

    #[test]
    fn install_copy_always_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let spec = ResourceSpec::file(root.path().join("loop.html"), 0o644);
        let installer = ResourceInstaller::direct();

        installer.install_copy(&spec, b"v1").unwrap();
        installer.install_copy(&spec, b"v2").unwrap();

        assert_eq!(fs::read(&spec.path).unwrap(), b"v2");
        assert_eq!(mode_of(&spec.path).unwrap(), 0o644);
    }

    #[test]
    fn install_copy_rejects_directory_spec() {
        let root = tempfile::tempdir().unwrap();
        let spec = ResourceSpec::directory(root.path().join("d"), 0o755);
        assert!(ResourceInstaller::direct().install_copy(&spec, b"x").is_err());
    }

    #[test]
    fn sibling_temp_stays_in_destination_dir() {
        let tmp = sibling_temp_path(Path::new("/etc/apache2/sites-available/indi-allsky.conf"));
        assert_eq!(
            tmp,
            Path::new("/etc/apache2/sites-available/indi-allsky.conf.allsky-provision.tmp")
        );
    }

    #[test]
    fn elevated_log_file_is_created_and_handed_to_log_owner() {
        let root = tempfile::tempdir().unwrap();
        let log = root.path().join("indi-allsky.log");
        let (recorder, installer) = recorded();
        assert_eq!(installer.elevation(), Elevation::Sudo);

        let spec = ResourceSpec::file(&log, 0o644).owned_by(Owner::new("syslog", "adm"));
        installer.ensure(&spec).unwrap();

        assert_eq!(
            recorder.calls(),
            [
                format!("touch {}", log.display()),
                format!("chmod 644 {}", log.display()),
                format!("chown syslog:adm {}", log.display()),
            ]
        );
    }

    #[test]
    fn elevated_existing_directory_only_gets_attributes() {
        let root = tempfile::tempdir().unwrap();
        let (recorder, installer) = recorded();

        installer
            .ensure(&ResourceSpec::directory(root.path(), 0o755).owned_by(Owner::new("pi", "pi")))
            .unwrap();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("chmod 755 "));
        assert!(calls[1].starts_with("chown pi:pi "));
    }

    #[test]
    fn elevated_copy_lands_beside_destination_before_move() {
        let dest = Path::new("/etc/indi-allsky/flask.json");
        let temp = "/etc/indi-allsky/flask.json.allsky-provision.tmp";
        let (recorder, installer) = recorded();

        let spec = ResourceSpec::file(dest, 0o640).owned_by(Owner::new("pi", "pi"));
        installer.install_copy(&spec, b"{}").unwrap();

        assert_eq!(
            recorder.calls(),
            [
                format!("cp {temp}"),
                format!("chmod 640 {temp}"),
                format!("chown pi:pi {temp}"),
                format!("mv {temp} /etc/indi-allsky/flask.json"),
            ]
        );
    }
}
