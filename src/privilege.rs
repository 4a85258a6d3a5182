// Changing a GPU power limit requires an elevated execution context:
// root on Unix, an administrator token on Windows

pub trait PrivilegeChecker {
    // Pure query, no side effects
    fn is_elevated(&self) -> bool;
}

// Effective-uid-zero check
#[cfg(unix)]
pub struct EuidChecker;

#[cfg(unix)]
impl PrivilegeChecker for EuidChecker {
    fn is_elevated(&self) -> bool {
        // Safety: geteuid takes no arguments and cannot fail
        unsafe { libc::geteuid() == 0 }
    }
}

// Administrator-token check
#[cfg(windows)]
pub struct AdminTokenChecker;

#[cfg(windows)]
impl PrivilegeChecker for AdminTokenChecker {
    fn is_elevated(&self) -> bool {
        // Safety: shell32 call with no arguments
        unsafe { windows_sys::Win32::UI::Shell::IsUserAnAdmin() != 0 }
    }
}

// Return the privilege checker for the current platform
#[cfg(unix)]
pub fn system_checker() -> Box<dyn PrivilegeChecker> {
    Box::new(EuidChecker)
}

#[cfg(windows)]
pub fn system_checker() -> Box<dyn PrivilegeChecker> {
    Box::new(AdminTokenChecker)
}
