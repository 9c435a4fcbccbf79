//! Rutube: generic scraping, provider specific autoplay parameter.

use crate::env::Env;
use crate::error::Result;
use crate::record::MediaValue;
use crate::registry::step_fn;
use crate::rules::{Domain, StepRef};

pub fn domain() -> Result<Domain> {
    Ok(Domain::new("rutube.ru")
        .pattern(r"(?i)^https?://(?:www\.)?rutube\.ru.*")?
        .mixins_after(vec![StepRef::Wildcard, StepRef::Inline(step_fn(autoplay))]))
}

fn autoplay(env: &mut Env<'_>) -> Result<()> {
    for snippet in &mut env.result.snippets {
        if snippet.is_kind("text/html") && snippet.has_tag("player") {
            snippet.set_media("autoplay", Some(MediaValue::from("autoStart=true")));
        }
    }
    Ok(())
}
