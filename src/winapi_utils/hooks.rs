//! Windows hook installation and management.
//!
//! Provides RAII wrappers for Windows low-level hooks to ensure
//! proper cleanup when hooks go out of scope.

use windows::Win32::UI::WindowsAndMessaging::{
    SetWindowsHookExW, UnhookWindowsHookEx, HHOOK, HOOKPROC, WH_KEYBOARD_LL, WH_MOUSE_LL,
    WINDOWS_HOOK_ID,
};

/// RAII guard for a Windows hook.
///
/// Calls `UnhookWindowsHookEx` when dropped. Low-level hooks are tied to
/// the installing thread, which must pump messages while the guard lives.
pub struct HookGuard {
    handle: HHOOK,
    hook_type: &'static str,
}

impl HookGuard {
    fn install(
        hook_id: WINDOWS_HOOK_ID,
        callback: HOOKPROC,
        hook_type: &'static str,
    ) -> windows::core::Result<Self> {
        let handle = unsafe { SetWindowsHookExW(hook_id, callback, None, 0)? };
        tracing::info!(hook_type, "Hook installed successfully");
        Ok(Self { handle, hook_type })
    }

    /// Installs a low-level keyboard hook (`WH_KEYBOARD_LL`).
    ///
    /// The callback must be fast and always end with `CallNextHookEx`.
    pub fn install_keyboard_hook(callback: HOOKPROC) -> windows::core::Result<Self> {
        Self::install(WH_KEYBOARD_LL, callback, "keyboard_ll")
    }

    /// Installs a low-level mouse hook (`WH_MOUSE_LL`).
    pub fn install_mouse_hook(callback: HOOKPROC) -> windows::core::Result<Self> {
        Self::install(WH_MOUSE_LL, callback, "mouse_ll")
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        match unsafe { UnhookWindowsHookEx(self.handle) } {
            Ok(_) => tracing::info!(hook_type = self.hook_type, "Hook uninstalled successfully"),
            Err(e) => tracing::error!(
                hook_type = self.hook_type,
                error = ?e,
                "Failed to unhook"
            ),
        }
    }
}
