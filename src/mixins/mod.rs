//! Built-in mixins: derive `result.meta` and `result.snippets` from the
//! data the fetchers collected.
//!
//! Snippet-producing mixins consult the domain whitelist before emitting
//! players or rich html; thumbnails and icons need no permission.

pub mod icons;
pub mod meta;
pub mod oembed;
pub mod og;
pub mod twitter;

use crate::registry::{step_fn, Mixin};

/// Built-in mixins in registration order.
pub fn builtin() -> Vec<Mixin> {
    vec![
        Mixin::new("meta", step_fn(meta::meta)),
        Mixin::new("twitter-thumbnail", step_fn(twitter::thumbnail)),
        Mixin::new("twitter-player", step_fn(twitter::player)),
        Mixin::new("og-player", step_fn(og::player)),
        Mixin::new("og-thumbnail", step_fn(og::thumbnail)),
        Mixin::new("oembed-player", step_fn(oembed::player)),
        Mixin::new("oembed-photo", step_fn(oembed::photo)),
        Mixin::new("oembed-icon", step_fn(oembed::icon)),
        Mixin::new("oembed-thumbnail", step_fn(oembed::thumbnail)),
        Mixin::new("oembed-rich", step_fn(oembed::rich)),
        Mixin::new("favicon", step_fn(icons::favicon)),
        Mixin::new("logo", step_fn(icons::logo)),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::engine::Engine;
    use crate::env::{Env, MetaTag};

    /// Engine for building envs in mixin tests. Never makes requests.
    pub fn engine() -> Engine {
        Engine::new().unwrap()
    }

    pub fn env<'a>(engine: &'a Engine, meta: &[(&str, &str)]) -> Env<'a> {
        let mut env = Env::new(engine, "https://example.com/page", "example.com");
        env.data.meta = meta.iter().map(|(n, v)| MetaTag::new(*n, *v)).collect();
        env
    }
}
