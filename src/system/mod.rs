pub mod hotkeys;
