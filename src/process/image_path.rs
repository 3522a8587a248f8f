//! Executable image path of another process.

use std::path::{Path, PathBuf};

use crate::process::ProcessSnapshot;

/// Full image path of `pid`'s executable; `None` on any failure.
#[cfg(unix)]
pub fn image_path_of(snapshot: &ProcessSnapshot, pid: u32) -> Option<PathBuf> {
    snapshot
        .process(pid)
        .and_then(|process| process.exe())
        .map(Path::to_path_buf)
}

#[cfg(windows)]
pub fn image_path_of(_snapshot: &ProcessSnapshot, pid: u32) -> Option<PathBuf> {
    use windows_sys::Win32::System::Threading::{
        PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, QueryFullProcessImageNameW,
    };

    let process = crate::process::handle::OwnedHandle::open(pid, PROCESS_QUERY_LIMITED_INFORMATION)?;
    let mut buffer = [0u16; 1024];
    let mut length = buffer.len() as u32;
    let ok = unsafe {
        QueryFullProcessImageNameW(process.0, PROCESS_NAME_WIN32, buffer.as_mut_ptr(), &mut length)
    };
    if ok == 0 {
        return None;
    }
    Some(PathBuf::from(String::from_utf16_lossy(
        &buffer[..length as usize],
    )))
}

/// Case-insensitive full-path equality, matching the filesystem's treatment
/// of executable paths.
pub fn paths_match(a: &Path, b: &Path) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}
