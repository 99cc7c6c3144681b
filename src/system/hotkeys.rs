use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};

/// System-wide layout toggle, Ctrl+Shift+Comma.
pub struct HotkeyManager {
    // Unregisters on drop
    _manager: GlobalHotKeyManager,
    toggle_hotkey_id: u32,
}

impl HotkeyManager {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let manager = GlobalHotKeyManager::new()?;

        let toggle = layout_toggle_hotkey();
        let toggle_id = toggle.id();
        manager.register(toggle)?;

        log::info!("Global hotkey registered: Ctrl+Shift+Comma (id={})", toggle_id);

        Ok(Self {
            _manager: manager,
            toggle_hotkey_id: toggle_id,
        })
    }

    /// Drain pending hotkey events. True if the toggle was pressed at least
    /// once; releases are ignored.
    pub fn poll_toggle(&self) -> bool {
        let mut fired = false;
        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            if is_toggle_press(&event, self.toggle_hotkey_id) {
                fired = true;
            }
        }
        fired
    }
}

fn layout_toggle_hotkey() -> HotKey {
    HotKey::new(Some(Modifiers::CONTROL | Modifiers::SHIFT), Code::Comma)
}

fn is_toggle_press(event: &GlobalHotKeyEvent, toggle_id: u32) -> bool {
    event.id == toggle_id && event.state == HotKeyState::Pressed
}
