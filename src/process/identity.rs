//! Principal identity: who owns a process, and at what privilege level.
//!
//! A server is only trusted when it runs as the same principal AND at the
//! same elevation as the client; a server started elevated must not serve
//! an unelevated client, and vice versa.

#[cfg(windows)]
use crate::error::ClientError;
use crate::error::Result;
use crate::process::ProcessSnapshot;

/// The invoking principal: a user identity plus a privilege-elevation flag.
///
/// On Windows this is the token's user SID (raw bytes) and its
/// `TokenElevation` state. On Unix it is the effective uid, with euid 0
/// standing in for elevation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalIdentity {
    #[cfg(windows)]
    sid: Vec<u8>,
    #[cfg(unix)]
    uid: u32,
    elevated: bool,
}

impl PrincipalIdentity {
    /// Both the identity and the elevation flag must match.
    pub fn matches(&self, other: &PrincipalIdentity) -> bool {
        self == other
    }

    /// Identity of the current process.
    ///
    /// # Errors
    ///
    /// Fatal when the identity cannot be read: without knowing who we are,
    /// no candidate server can be trusted.
    #[cfg(unix)]
    pub fn current() -> Result<Self> {
        let uid = unsafe { libc::geteuid() } as u32;
        Ok(Self {
            uid,
            elevated: uid == 0,
        })
    }

    #[cfg(windows)]
    pub fn current() -> Result<Self> {
        use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
        use windows_sys::Win32::Security::TOKEN_QUERY;

        unsafe {
            let mut token = std::ptr::null_mut();
            if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
                return Err(ClientError::IdentityUnavailable(
                    std::io::Error::last_os_error().to_string(),
                ));
            }
            let token = crate::process::handle::OwnedHandle(token);
            windows_impl::token_identity(token.0).ok_or_else(|| {
                ClientError::IdentityUnavailable(std::io::Error::last_os_error().to_string())
            })
        }
    }
}

/// Identity of another process; `None` on any failure (a process we cannot
/// query is simply not a match, never an error).
#[cfg(unix)]
pub fn identity_of(snapshot: &ProcessSnapshot, pid: u32) -> Option<PrincipalIdentity> {
    let process = snapshot.process(pid)?;
    let uid = process
        .effective_user_id()
        .or_else(|| process.user_id())?;
    let uid = **uid as u32;
    Some(PrincipalIdentity {
        uid,
        elevated: uid == 0,
    })
}

#[cfg(windows)]
pub fn identity_of(_snapshot: &ProcessSnapshot, pid: u32) -> Option<PrincipalIdentity> {
    use windows_sys::Win32::Security::TOKEN_QUERY;
    use windows_sys::Win32::System::Threading::{OpenProcessToken, PROCESS_QUERY_LIMITED_INFORMATION};

    let process = crate::process::handle::OwnedHandle::open(pid, PROCESS_QUERY_LIMITED_INFORMATION)?;
    unsafe {
        let mut token = std::ptr::null_mut();
        if OpenProcessToken(process.0, TOKEN_QUERY, &mut token) == 0 {
            return None;
        }
        let token = crate::process::handle::OwnedHandle(token);
        windows_impl::token_identity(token.0)
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::PrincipalIdentity;
    use std::ffi::c_void;

    use windows_sys::Win32::Security::{
        GetLengthSid, GetTokenInformation, TOKEN_ELEVATION, TOKEN_USER, TokenElevation, TokenUser,
    };

    /// Read the user SID and elevation state out of an open token handle.
    pub(super) unsafe fn token_identity(token: *mut c_void) -> Option<PrincipalIdentity> {
        unsafe {
            let mut needed = 0u32;
            GetTokenInformation(token, TokenUser, std::ptr::null_mut(), 0, &mut needed);
            if needed == 0 {
                return None;
            }
            let mut user_buf = vec![0u8; needed as usize];
            if GetTokenInformation(
                token,
                TokenUser,
                user_buf.as_mut_ptr() as *mut c_void,
                needed,
                &mut needed,
            ) == 0
            {
                return None;
            }
            let token_user = &*(user_buf.as_ptr() as *const TOKEN_USER);
            let sid_ptr = token_user.User.Sid;
            if sid_ptr.is_null() {
                return None;
            }
            let sid_len = GetLengthSid(sid_ptr) as usize;
            let sid = std::slice::from_raw_parts(sid_ptr as *const u8, sid_len).to_vec();

            let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
            let mut elevation_len = std::mem::size_of::<TOKEN_ELEVATION>() as u32;
            if GetTokenInformation(
                token,
                TokenElevation,
                &mut elevation as *mut TOKEN_ELEVATION as *mut c_void,
                elevation_len,
                &mut elevation_len,
            ) == 0
            {
                return None;
            }

            Some(PrincipalIdentity {
                sid,
                elevated: elevation.TokenIsElevated != 0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_identity_is_readable() {
        let identity = PrincipalIdentity::current().unwrap();
        assert!(identity.matches(&identity));
    }

    #[cfg(unix)]
    #[test]
    fn own_process_identity_matches_current() {
        let snapshot = ProcessSnapshot::capture();
        let own = identity_of(&snapshot, std::process::id()).expect("own process visible");
        let current = PrincipalIdentity::current().unwrap();
        assert!(current.matches(&own));
    }

    #[cfg(unix)]
    #[test]
    fn differing_uid_does_not_match() {
        let current = PrincipalIdentity::current().unwrap();
        let other = PrincipalIdentity {
            uid: u32::MAX - 1,
            elevated: false,
        };
        assert!(!current.matches(&other));
    }

    #[cfg(unix)]
    #[test]
    fn differing_elevation_does_not_match() {
        let a = PrincipalIdentity {
            uid: 1000,
            elevated: false,
        };
        let b = PrincipalIdentity {
            uid: 1000,
            elevated: true,
        };
        assert!(!a.matches(&b));
    }

    #[cfg(unix)]
    #[test]
    fn unknown_pid_yields_no_identity() {
        let snapshot = ProcessSnapshot::capture();
        assert!(identity_of(&snapshot, u32::MAX - 2).is_none());
    }
}
