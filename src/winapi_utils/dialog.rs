//! Native alert boxes.

use windows::core::HSTRING;
use windows::Win32::UI::WindowsAndMessaging::{
    MessageBoxW, MB_ICONWARNING, MB_OK, MB_SETFOREGROUND, MB_TOPMOST,
};

/// Shows a topmost warning box on its own thread and returns immediately.
pub fn show_message_box(title: &str, message: &str) {
    let title = HSTRING::from(title);
    let message = HSTRING::from(message);

    let spawned = std::thread::Builder::new()
        .name("alert-box".to_string())
        .spawn(move || unsafe {
            MessageBoxW(
                None,
                &message,
                &title,
                MB_OK | MB_ICONWARNING | MB_TOPMOST | MB_SETFOREGROUND,
            );
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Could not show alert box");
    }
}
