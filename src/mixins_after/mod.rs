//! Built-in mixins-after: normalize the snippets the mixins produced.
//!
//! # Architecture
//!
//! Runs in this order for a wildcard:
//!
//! 1. `resolve-href`: relative and protocol-relative hrefs -> absolute
//! 2. `mime-detect`: fill missing snippet types (extension or HEAD request)
//! 3. `ssl-force`: tag https snippets with `ssl`
//! 4. `merge`: fold snippets sharing an href
//! 5. `image-size`: probe the dimensions of unsized images
//! 6. `set-autoplay`: autoplay query parameter for html players
//! 7. `convert-str-int`: media sizes and durations -> numbers

pub mod dimensions;
pub mod href;
pub mod mime;
pub mod normalize;

use std::sync::Arc;

use crate::registry::{step_fn, Mixin};

/// Built-in mixins-after in registration order.
pub fn builtin() -> Vec<Mixin> {
    vec![
        Mixin::new("resolve-href", step_fn(href::resolve_href)),
        Mixin::new("mime-detect", Arc::new(mime::MimeDetect)),
        Mixin::new("ssl-force", step_fn(href::ssl_force)),
        Mixin::new("merge", step_fn(normalize::merge)),
        Mixin::new("image-size", Arc::new(dimensions::ImageSize)),
        Mixin::new("set-autoplay", step_fn(normalize::set_autoplay)),
        Mixin::new("convert-str-int", step_fn(normalize::convert_str_int)),
    ]
}
