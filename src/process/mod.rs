//! Host process probes: pid enumeration, principal identity, image paths.
//!
//! The controller trusts a running server only if its executable image path
//! and its principal identity both match this client's expectations; the
//! probes in this module answer those two questions for arbitrary pids.

pub mod enumerate;
pub mod identity;
pub mod image_path;

pub use enumerate::ProcessSnapshot;
pub use identity::PrincipalIdentity;

#[cfg(windows)]
pub(crate) mod handle {
    use std::ffi::c_void;

    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::OpenProcess;

    /// Owned process handle, closed on drop.
    pub(crate) struct OwnedHandle(pub(crate) *mut c_void);

    impl OwnedHandle {
        /// Open `pid` with the given access mask; `None` if the process is
        /// gone or access is denied.
        pub(crate) fn open(pid: u32, access: u32) -> Option<Self> {
            let handle = unsafe { OpenProcess(access, 0, pid) };
            if handle.is_null() {
                None
            } else {
                Some(Self(handle))
            }
        }
    }

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            unsafe {
                CloseHandle(self.0);
            }
        }
    }
}
