pub mod media;
pub mod socket;

pub use media::MediaClient;
pub use socket::{CallSocket, SocketEvent};
