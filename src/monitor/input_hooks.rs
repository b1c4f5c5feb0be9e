//! Raw input entry points and the Windows low-level hook listener.
//!
//! [`InputHandle`] is the platform-neutral surface: each method is one raw
//! keyboard or mouse event, routed to the keyboard aggregator or the mouse
//! coalescer. On Windows, [`spawn_input_listener`] installs `WH_KEYBOARD_LL`
//! and `WH_MOUSE_LL` hooks on a dedicated message-pump thread and feeds a
//! dispatcher thread through a channel.
//!
//! # Hook latency
//!
//! The hook callbacks run synchronously in the Windows input pipeline. They
//! only copy the event into the channel (never blocking on a contended lock)
//! and always call `CallNextHookEx`. All aggregation happens on the
//! dispatcher thread.

use super::keyboard::KeyboardSessionAggregator;
use super::mouse::MouseEventCoalescer;
use crate::engine::RunFlag;
use crate::store::ScreenPosition;
use std::sync::Arc;

/// Mouse button that produced a press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        }
    }
}

/// Cloneable sink for raw input events.
///
/// Input is dropped while the run flag is cleared, so nothing reaches the
/// aggregators between `stop` and the next `start`.
#[derive(Debug, Clone)]
pub struct InputHandle {
    keyboard: Arc<KeyboardSessionAggregator>,
    mouse: Arc<MouseEventCoalescer>,
    run: RunFlag,
}

impl InputHandle {
    pub fn new(
        keyboard: Arc<KeyboardSessionAggregator>,
        mouse: Arc<MouseEventCoalescer>,
        run: RunFlag,
    ) -> Self {
        Self {
            keyboard,
            mouse,
            run,
        }
    }

    pub fn key_pressed(&self) {
        if self.run.is_running() {
            self.keyboard.key_pressed();
        }
    }

    pub fn mouse_pressed(&self, position: ScreenPosition, button: MouseButton) {
        if self.run.is_running() {
            self.mouse.pressed(position, button.as_str());
        }
    }

    pub fn mouse_released(&self, position: ScreenPosition) {
        if self.run.is_running() {
            self.mouse.released(position);
        }
    }

    pub fn mouse_moved(&self, position: ScreenPosition) {
        if self.run.is_running() {
            self.mouse.moved(position);
        }
    }
}

/// One raw event as captured by a hook callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInput {
    KeyDown,
    ButtonDown(ScreenPosition, MouseButton),
    ButtonUp(ScreenPosition),
    Move(ScreenPosition),
}

impl RawInput {
    /// Routes the event to the matching aggregator.
    pub fn dispatch(self, handle: &InputHandle) {
        match self {
            Self::KeyDown => handle.key_pressed(),
            Self::ButtonDown(position, button) => handle.mouse_pressed(position, button),
            Self::ButtonUp(position) => handle.mouse_released(position),
            Self::Move(position) => handle.mouse_moved(position),
        }
    }
}

#[cfg(windows)]
pub use platform::{spawn_input_listener, InputListener};

#[cfg(windows)]
mod platform {
    use super::{InputHandle, MouseButton, RawInput};
    use crate::engine::RunFlag;
    use crate::error::{MonitorError, Result};
    use crate::winapi_utils::{current_thread_id, post_quit, run_message_loop, HookGuard};
    use std::sync::mpsc::{self, Sender};
    use std::sync::Mutex;
    use std::thread::{self, JoinHandle};
    use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, HC_ACTION, MSLLHOOKSTRUCT, WM_KEYDOWN, WM_LBUTTONDOWN, WM_LBUTTONUP,
        WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEMOVE, WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN,
    };

    /// Channel into the dispatcher, set while the listener is installed.
    static RAW_INPUT_TX: Mutex<Option<Sender<RawInput>>> = Mutex::new(None);

    fn forward(input: RawInput) {
        // Never block the input pipeline; an event lost to contention is
        // preferable to system-wide input lag.
        if let Ok(guard) = RAW_INPUT_TX.try_lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(input);
            }
        }
    }

    unsafe extern "system" fn keyboard_hook_proc(
        code: i32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        if code == HC_ACTION as i32 {
            let msg = wparam.0 as u32;
            if msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN {
                forward(RawInput::KeyDown);
            }
        }

        CallNextHookEx(None, code, wparam, lparam)
    }

    unsafe extern "system" fn mouse_hook_proc(
        code: i32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        if code == HC_ACTION as i32 && lparam.0 != 0 {
            let info = &*(lparam.0 as *const MSLLHOOKSTRUCT);
            let position = (info.pt.x, info.pt.y);

            let input = match wparam.0 as u32 {
                WM_LBUTTONDOWN => Some(RawInput::ButtonDown(position, MouseButton::Left)),
                WM_RBUTTONDOWN => Some(RawInput::ButtonDown(position, MouseButton::Right)),
                WM_MBUTTONDOWN => Some(RawInput::ButtonDown(position, MouseButton::Middle)),
                WM_LBUTTONUP | WM_RBUTTONUP | WM_MBUTTONUP => Some(RawInput::ButtonUp(position)),
                WM_MOUSEMOVE => Some(RawInput::Move(position)),
                _ => None,
            };
            if let Some(input) = input {
                forward(input);
            }
        }

        CallNextHookEx(None, code, wparam, lparam)
    }

    /// Running hook listener. Dropping it without [`InputListener::stop`]
    /// leaves the hooks installed until process exit.
    pub struct InputListener {
        hook_thread_id: u32,
        hook_thread: JoinHandle<()>,
        dispatcher: JoinHandle<()>,
    }

    impl InputListener {
        /// Quits the hook thread's message loop and joins both threads.
        pub fn stop(self) {
            post_quit(self.hook_thread_id);
            if self.hook_thread.join().is_err() {
                tracing::error!("Input hook thread panicked");
            }
            if self.dispatcher.join().is_err() {
                tracing::error!("Input dispatcher thread panicked");
            }
        }
    }

    /// Installs the keyboard and mouse hooks and starts dispatching.
    ///
    /// Fails with a listener error if either hook cannot be installed. If
    /// the message loop dies while the monitor is running, the run flag is
    /// cleared so every other loop winds down.
    pub fn spawn_input_listener(handle: InputHandle, run: RunFlag) -> Result<InputListener> {
        let (tx, rx) = mpsc::channel::<RawInput>();
        *RAW_INPUT_TX.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);

        let dispatcher = thread::Builder::new()
            .name("input-dispatcher".to_string())
            .spawn(move || {
                for input in rx {
                    input.dispatch(&handle);
                }
                tracing::debug!("Input dispatcher drained");
            })
            .map_err(|source| MonitorError::Spawn {
                name: "input dispatcher",
                source,
            })?;

        let (ready_tx, ready_rx) = mpsc::sync_channel::<std::result::Result<u32, String>>(1);
        let hook_thread = thread::Builder::new()
            .name("input-hooks".to_string())
            .spawn(move || {
                let hooks = HookGuard::install_keyboard_hook(Some(keyboard_hook_proc)).and_then(
                    |keyboard| {
                        HookGuard::install_mouse_hook(Some(mouse_hook_proc))
                            .map(|mouse| (keyboard, mouse))
                    },
                );
                let _hooks = match hooks {
                    Ok(hooks) => hooks,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        close_channel();
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(current_thread_id()));

                run_message_loop();

                if run.is_running() {
                    tracing::error!("Input message loop exited unexpectedly, stopping monitor");
                    run.stop();
                }
                close_channel();
            })
            .map_err(|source| {
                close_channel();
                MonitorError::Spawn {
                    name: "input hooks",
                    source,
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(hook_thread_id)) => {
                tracing::info!(thread_id = hook_thread_id, "Input listener running");
                Ok(InputListener {
                    hook_thread_id,
                    hook_thread,
                    dispatcher,
                })
            }
            Ok(Err(reason)) => {
                let _ = hook_thread.join();
                let _ = dispatcher.join();
                Err(MonitorError::Listener(format!("hook installation failed: {reason}")))
            }
            Err(_) => {
                let _ = hook_thread.join();
                let _ = dispatcher.join();
                Err(MonitorError::Listener(
                    "hook thread exited before reporting".to_string(),
                ))
            }
        }
    }

    /// Drops the sender so the dispatcher loop ends.
    fn close_channel() {
        RAW_INPUT_TX
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EventPayload, EventQueue};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn handle() -> (Arc<EventQueue>, Arc<KeyboardSessionAggregator>, InputHandle) {
        let run = RunFlag::new();
        run.start();
        handle_with(run)
    }

    fn handle_with(
        run: RunFlag,
    ) -> (Arc<EventQueue>, Arc<KeyboardSessionAggregator>, InputHandle) {
        let queue = Arc::new(EventQueue::new());
        let keyboard = Arc::new(KeyboardSessionAggregator::new(
            Arc::clone(&queue),
            Arc::new(AtomicBool::new(false)),
            Duration::from_secs(10),
        ));
        let mouse = Arc::new(MouseEventCoalescer::new(
            Arc::clone(&queue),
            Duration::from_millis(500),
        ));
        let handle = InputHandle::new(Arc::clone(&keyboard), mouse, run);
        (queue, keyboard, handle)
    }

    #[test]
    fn test_dispatch_routes_raw_input() {
        let (queue, keyboard, handle) = handle();

        for input in [
            RawInput::KeyDown,
            RawInput::KeyDown,
            RawInput::Move((3, 3)),
            RawInput::ButtonDown((10, 20), MouseButton::Right),
            RawInput::ButtonUp((40, 50)),
        ] {
            input.dispatch(&handle);
        }
        keyboard.flush();

        let events = queue.drain_all();
        let kinds: Vec<_> = events.iter().map(|e| e.kind().as_str()).collect();
        assert_eq!(kinds, vec!["mouse_click", "mouse_movement", "keyboard_session"]);

        assert!(matches!(
            &events[0].payload,
            EventPayload::MouseClick { button, .. } if button == "right"
        ));
        match &events[2].payload {
            EventPayload::KeyboardSession(session) => assert_eq!(session.keystroke_count, 2),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_handle_clones_share_aggregators() {
        let (queue, keyboard, handle) = handle();
        let other = handle.clone();

        handle.key_pressed();
        other.key_pressed();
        keyboard.flush();

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_input_ignored_while_stopped() {
        let run = RunFlag::new();
        let (queue, keyboard, handle) = handle_with(run.clone());

        handle.key_pressed();
        handle.mouse_pressed((0, 0), MouseButton::Left);
        handle.mouse_released((5, 5));
        assert!(!keyboard.is_active());
        assert!(queue.is_empty());

        run.start();
        handle.key_pressed();
        assert!(keyboard.is_active());
        keyboard.flush();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_button_names() {
        assert_eq!(MouseButton::Left.as_str(), "left");
        assert_eq!(MouseButton::Right.as_str(), "right");
        assert_eq!(MouseButton::Middle.as_str(), "middle");
    }
}
