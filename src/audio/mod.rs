pub mod decode;
pub mod player;

pub use decode::{decode_to_mono, DecodedAudio};
pub use player::AudioPlayer;
