//! Impls - ports の実装
//!
//! - **Slp2Mp4Converter**: slp2mp4 + ffmpeg による本番用 Converter

pub mod blackdetect;
pub mod slp2mp4;

pub use self::slp2mp4::{Slp2Mp4Converter, ToolPaths};
