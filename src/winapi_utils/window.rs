//! Foreground window queries.

use crate::collaborators::ActiveWindowSource;
use crate::error::CollaboratorError;
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{
    GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW,
};

/// Gets the handle of the currently focused (foreground) window.
///
/// Returns `None` if no window has focus (e.g., desktop is focused).
pub fn get_foreground_window() -> Option<HWND> {
    let hwnd = unsafe { GetForegroundWindow() };
    if hwnd.0.is_null() {
        None
    } else {
        Some(hwnd)
    }
}

/// Gets the title text of a window.
///
/// Returns an empty string if the window has no title or if the call fails.
pub fn get_window_text(hwnd: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return String::new();
        }

        // Room for the null terminator.
        let mut buffer: Vec<u16> = vec![0; (len + 1) as usize];

        let copied = GetWindowTextW(hwnd, &mut buffer);
        if copied <= 0 {
            return String::new();
        }

        String::from_utf16_lossy(&buffer[..copied as usize])
    }
}

/// [`ActiveWindowSource`] backed by the foreground window.
#[derive(Debug, Default)]
pub struct ForegroundWindowSource;

impl ActiveWindowSource for ForegroundWindowSource {
    fn active_window_title(&mut self) -> Result<Option<String>, CollaboratorError> {
        Ok(get_foreground_window()
            .map(get_window_text)
            .filter(|title| !title.is_empty()))
    }
}
