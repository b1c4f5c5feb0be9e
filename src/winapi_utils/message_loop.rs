//! Windows message loop utilities.
//!
//! Low-level hooks only fire while the installing thread pumps messages.
//! The loop runs until another thread posts `WM_QUIT` to it by thread id.

use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PostThreadMessageW, TranslateMessage, MSG, WM_QUIT,
};

/// Id of the calling thread, used as the target of [`post_quit`].
pub fn current_thread_id() -> u32 {
    unsafe { GetCurrentThreadId() }
}

/// Pumps messages on the calling thread until `WM_QUIT` arrives.
pub fn run_message_loop() {
    tracing::debug!(thread_id = current_thread_id(), "Message loop starting");

    let mut msg = MSG::default();
    unsafe {
        // 0 on WM_QUIT, -1 on error; both end the loop.
        while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    tracing::debug!("Message loop exited");
}

/// Asks the message loop on `thread_id` to exit.
pub fn post_quit(thread_id: u32) {
    let result = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
    match result {
        Ok(()) => tracing::debug!(thread_id, "Posted quit message"),
        Err(e) => tracing::error!(?e, thread_id, "Failed to post quit message"),
    }
}
