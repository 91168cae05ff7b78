//! Converter port - replay → video の外部変換手続き
//!
//! worker はこの trait だけを知っています。subprocess の呼び出しや
//! 作業ディレクトリの後始末は実装側（impls::slp2mp4）の責務です。

use async_trait::async_trait;

use crate::domain::{ConversionError, InputRef};

/// Converts one input artifact into the bytes of the output video.
///
/// Implementations report recoverable problems as `Err` and never panic.
/// Dropping the returned future must stop any external process it started.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, input: &InputRef) -> Result<Vec<u8>, ConversionError>;
}
