//! Native client for a one-on-one video call with an AI companion.
//!
//! The remote pane shows the companion and its emotion tag, the local pane
//! shows the webcam. Either pane can be full-size with the other as a
//! draggable picture-in-picture. Webcam frames are sampled on a fixed period
//! and streamed to the call server, which answers with spoken responses.

pub mod api;
pub mod app;
pub mod audio;
pub mod avatar;
pub mod call;
pub mod compositor;
pub mod config;
pub mod media;
pub mod system;
