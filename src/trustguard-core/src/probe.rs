//! Platform introspection capability layer.
//!
//! Every OS-specific observation the detectors need goes through the
//! [`PlatformProbe`] trait, keeping the engine core platform-agnostic.
//! Two implementations ship with the crate:
//!
//! - [`HostProbe`]: the real probe for unix-like hosts (`/proc` reads,
//!   `ptrace`, SELinux status, bounded command execution).
//! - [`ScriptedProbe`]: a fully scriptable in-memory probe for tests and
//!   host-app integration harnesses.
//!
//! Probe methods never panic and never block unbounded: command execution
//! carries an internal deadline and reports failure on timeout.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

/// One mapped memory region of the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Backing path, empty for anonymous mappings.
    pub path: String,
    /// Writable mapping.
    pub writable: bool,
    /// Executable mapping.
    pub executable: bool,
}

/// Capability interface for all OS introspection.
pub trait PlatformProbe: Send + Sync {
    /// Whether a filesystem path exists.
    fn path_exists(&self, path: &str) -> bool;

    /// Read a file's contents.
    fn read_bytes(&self, path: &str) -> std::io::Result<Vec<u8>>;

    /// Whether a package/app identifier is installed.
    fn package_installed(&self, package: &str) -> bool;

    /// Read a system build property.
    fn system_property(&self, name: &str) -> Option<String>;

    /// Names/paths of shared libraries loaded into the process.
    fn loaded_libraries(&self) -> Vec<String>;

    /// Visible symbol/method names, for hooking-framework scans.
    ///
    /// Platforms without symbol enumeration return an empty list.
    fn symbol_table(&self) -> Vec<String>;

    /// Memory mappings of the running process.
    fn memory_regions(&self) -> Vec<MemoryRegion>;

    /// Pid of an attached tracer, if any.
    fn tracer_pid(&self) -> Option<i32>;

    /// OS debug API verdict on an attached debugger.
    fn debugger_attached(&self) -> bool;

    /// SELinux enforcement status. `None` when the status cannot be read.
    fn selinux_enforcing(&self) -> Option<bool>;

    /// Identifier of the installing origin, if the platform exposes one.
    fn installer_package(&self) -> Option<String>;

    /// Permissions declared by the application manifest.
    fn declared_permissions(&self) -> Vec<String>;

    /// Live package/binary signature digest (SHA-256 hex).
    fn signature_sha256(&self) -> Option<String>;

    /// Run a command with an internal deadline.
    ///
    /// Returns the trimmed stdout on success. Failure to spawn, a non-zero
    /// exit, or hitting the deadline all return `None`; callers treat
    /// that as the command being unavailable.
    fn run_command(&self, program: &str, args: &[&str], timeout: Duration) -> Option<String>;
}

// =============================================================================
// Host implementation (unix)
// =============================================================================

/// Real probe for unix-like hosts.
#[derive(Debug, Default)]
pub struct HostProbe;

impl HostProbe {
    /// Create a host probe.
    pub fn new() -> Self {
        Self
    }

    /// Parse `/proc/self/status` for the `TracerPid:` line.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn read_tracer_pid() -> Option<i32> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("TracerPid:") {
                return rest.trim().parse::<i32>().ok();
            }
        }
        None
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn read_tracer_pid() -> Option<i32> {
        None
    }

    /// Parse `/proc/self/maps` into regions.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn read_memory_regions() -> Vec<MemoryRegion> {
        let Ok(maps) = std::fs::read_to_string("/proc/self/maps") else {
            return Vec::new();
        };
        maps.lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let _range = fields.next()?;
                let perms = fields.next()?;
                let path = fields.nth(3).unwrap_or("").to_string();
                Some(MemoryRegion {
                    path,
                    writable: perms.contains('w'),
                    executable: perms.contains('x'),
                })
            })
            .collect()
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn read_memory_regions() -> Vec<MemoryRegion> {
        Vec::new()
    }
}

impl PlatformProbe for HostProbe {
    fn path_exists(&self, path: &str) -> bool {
        std::path::Path::new(path).exists()
    }

    fn read_bytes(&self, path: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn package_installed(&self, package: &str) -> bool {
        // Package data directories are the observable artifact without a
        // package-manager binder connection.
        std::path::Path::new(&format!("/data/data/{package}")).exists()
            || std::path::Path::new(&format!("/data/app/{package}")).exists()
    }

    fn system_property(&self, name: &str) -> Option<String> {
        let props = std::fs::read_to_string("/system/build.prop").ok()?;
        for line in props.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix(name) {
                if let Some(value) = rest.strip_prefix('=') {
                    return Some(value.trim().to_string());
                }
            }
        }
        None
    }

    fn loaded_libraries(&self) -> Vec<String> {
        Self::read_memory_regions()
            .into_iter()
            .filter(|r| r.path.ends_with(".so") || r.path.contains(".so."))
            .map(|r| r.path)
            .collect()
    }

    fn symbol_table(&self) -> Vec<String> {
        // No in-process symbol enumeration on the host probe; hooking
        // detection falls back to library and memory scans.
        Vec::new()
    }

    fn memory_regions(&self) -> Vec<MemoryRegion> {
        Self::read_memory_regions()
    }

    fn tracer_pid(&self) -> Option<i32> {
        Self::read_tracer_pid()
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn debugger_attached(&self) -> bool {
        // A live tracer is the authoritative signal; the ptrace self-probe
        // is a second opinion that also catches seccomp-filtered tracers.
        if Self::read_tracer_pid().is_some_and(|pid| pid != 0) {
            return true;
        }
        unsafe {
            if libc::ptrace(libc::PTRACE_TRACEME, 0, 0, 0) == -1 {
                return true;
            }
            libc::ptrace(libc::PTRACE_DETACH, 0, 0, 0);
        }
        false
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn debugger_attached(&self) -> bool {
        false
    }

    fn selinux_enforcing(&self) -> Option<bool> {
        match std::fs::read_to_string("/sys/fs/selinux/enforce") {
            Ok(value) => Some(value.trim() == "1"),
            Err(_) => None,
        }
    }

    fn installer_package(&self) -> Option<String> {
        // The installing origin comes from the platform package broker,
        // which the host app supplies when embedding the engine.
        None
    }

    fn declared_permissions(&self) -> Vec<String> {
        Vec::new()
    }

    fn signature_sha256(&self) -> Option<String> {
        let exe = std::env::current_exe().ok()?;
        let data = std::fs::read(exe).ok()?;
        Some(crate::digest::sha256_hex(&data))
    }

    fn run_command(&self, program: &str, args: &[&str], timeout: Duration) -> Option<String> {
        use std::process::{Command, Stdio};
        use std::time::Instant;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .ok()?;

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        return None;
                    }
                    let mut output = String::new();
                    if let Some(mut stdout) = child.stdout.take() {
                        use std::io::Read;
                        let _ = stdout.read_to_string(&mut output);
                    }
                    return Some(output.trim().to_string());
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!(program, "command deadline hit, killing");
                        let _ = child.kill();
                        let _ = child.wait();
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    debug!(program, error = %e, "command wait failed");
                    let _ = child.kill();
                    return None;
                }
            }
        }
    }
}

// =============================================================================
// Scripted implementation (tests, harnesses)
// =============================================================================

#[derive(Debug, Default)]
struct ScriptedState {
    paths: HashSet<String>,
    files: HashMap<String, Vec<u8>>,
    packages: HashSet<String>,
    properties: HashMap<String, String>,
    libraries: Vec<String>,
    symbols: Vec<String>,
    regions: Vec<MemoryRegion>,
    tracer_pid: Option<i32>,
    debugger: bool,
    selinux: Option<bool>,
    installer: Option<String>,
    permissions: Vec<String>,
    signature: Option<String>,
    commands: HashMap<String, String>,
}

/// In-memory probe whose every observation is scripted by the caller.
///
/// All setters take `&self` so a scenario can flip state while the monitor
/// thread holds the probe behind an `Arc`.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    state: Mutex<ScriptedState>,
}

impl ScriptedProbe {
    /// Create an empty probe: nothing exists, nothing is detected,
    /// SELinux enforcing, no debugger.
    pub fn new() -> Self {
        let probe = Self::default();
        probe.set_selinux_enforcing(Some(true));
        probe
    }

    /// Script a filesystem path as existing.
    pub fn add_path(&self, path: &str) {
        self.state.lock().unwrap().paths.insert(path.to_string());
    }

    /// Script a readable file with contents.
    pub fn add_file(&self, path: &str, contents: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.paths.insert(path.to_string());
        state.files.insert(path.to_string(), contents.to_vec());
    }

    /// Script an installed package.
    pub fn add_package(&self, package: &str) {
        self.state
            .lock()
            .unwrap()
            .packages
            .insert(package.to_string());
    }

    /// Script a system property value.
    pub fn set_property(&self, name: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .properties
            .insert(name.to_string(), value.to_string());
    }

    /// Script a loaded shared library.
    pub fn add_library(&self, library: &str) {
        self.state
            .lock()
            .unwrap()
            .libraries
            .push(library.to_string());
    }

    /// Script a visible symbol/method name.
    pub fn add_symbol(&self, symbol: &str) {
        self.state.lock().unwrap().symbols.push(symbol.to_string());
    }

    /// Script a memory region.
    pub fn add_region(&self, region: MemoryRegion) {
        self.state.lock().unwrap().regions.push(region);
    }

    /// Script the tracer pid.
    pub fn set_tracer_pid(&self, pid: Option<i32>) {
        self.state.lock().unwrap().tracer_pid = pid;
    }

    /// Script the OS debugger flag.
    pub fn set_debugger_attached(&self, attached: bool) {
        self.state.lock().unwrap().debugger = attached;
    }

    /// Script SELinux enforcement status.
    pub fn set_selinux_enforcing(&self, enforcing: Option<bool>) {
        self.state.lock().unwrap().selinux = enforcing;
    }

    /// Script the installing origin.
    pub fn set_installer(&self, installer: Option<&str>) {
        self.state.lock().unwrap().installer = installer.map(str::to_string);
    }

    /// Script a declared manifest permission.
    pub fn add_permission(&self, permission: &str) {
        self.state
            .lock()
            .unwrap()
            .permissions
            .push(permission.to_string());
    }

    /// Script the live signature digest.
    pub fn set_signature(&self, digest: Option<&str>) {
        self.state.lock().unwrap().signature = digest.map(str::to_string);
    }

    /// Script a command's successful stdout.
    pub fn add_command(&self, program: &str, stdout: &str) {
        self.state
            .lock()
            .unwrap()
            .commands
            .insert(program.to_string(), stdout.to_string());
    }
}

impl PlatformProbe for ScriptedProbe {
    fn path_exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().paths.contains(path)
    }

    fn read_bytes(&self, path: &str) -> std::io::Result<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
    }

    fn package_installed(&self, package: &str) -> bool {
        self.state.lock().unwrap().packages.contains(package)
    }

    fn system_property(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().properties.get(name).cloned()
    }

    fn loaded_libraries(&self) -> Vec<String> {
        self.state.lock().unwrap().libraries.clone()
    }

    fn symbol_table(&self) -> Vec<String> {
        self.state.lock().unwrap().symbols.clone()
    }

    fn memory_regions(&self) -> Vec<MemoryRegion> {
        self.state.lock().unwrap().regions.clone()
    }

    fn tracer_pid(&self) -> Option<i32> {
        self.state.lock().unwrap().tracer_pid
    }

    fn debugger_attached(&self) -> bool {
        self.state.lock().unwrap().debugger
    }

    fn selinux_enforcing(&self) -> Option<bool> {
        self.state.lock().unwrap().selinux
    }

    fn installer_package(&self) -> Option<String> {
        self.state.lock().unwrap().installer.clone()
    }

    fn declared_permissions(&self) -> Vec<String> {
        self.state.lock().unwrap().permissions.clone()
    }

    fn signature_sha256(&self) -> Option<String> {
        self.state.lock().unwrap().signature.clone()
    }

    fn run_command(&self, program: &str, _args: &[&str], _timeout: Duration) -> Option<String> {
        self.state.lock().unwrap().commands.get(program).cloned()
    }
}
