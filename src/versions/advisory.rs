use tracing::info;

use super::{compare_tags, newest_stable, WordPressTag, TRUNK};
use crate::config::prompt::Prompter;
use crate::environment::{InstanceDescriptor, WordPressSource};
use crate::error::Result;

/// Outcome of the upgrade check run by `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advice {
    /// Nothing newer, or the environment asked not to be bothered.
    UpToDate,
    /// A newer release exists but no terminal is attached to ask.
    Skipped(WordPressTag),
    /// The user switched to a newer release; the descriptor was updated.
    Upgraded(WordPressTag),
    /// The user kept the current release this time.
    Declined,
    /// The user kept the current release and disabled future prompts.
    Silenced,
}

impl Advice {
    /// Whether the descriptor changed and must be persisted.
    pub fn changed_descriptor(&self) -> bool {
        matches!(self, Advice::Upgraded(_) | Advice::Silenced)
    }
}

/// The newest release if it is newer than what the environment pins.
pub fn newer_release<'a>(
    current: &WordPressSource,
    manifest: &'a [WordPressTag],
) -> Option<&'a WordPressTag> {
    if current.do_not_upgrade == Some(true) || current.tag == TRUNK {
        return None;
    }
    let newest = newest_stable(manifest)?;
    (compare_tags(&newest.tag, &current.tag).is_gt()).then_some(newest)
}

/// Offer to move the environment to the newest WordPress release.
pub fn advise(
    descriptor: &mut InstanceDescriptor,
    manifest: &[WordPressTag],
    prompter: &dyn Prompter,
) -> Result<Advice> {
    let Some(newest) = newer_release(&descriptor.wordpress, manifest).cloned() else {
        return Ok(Advice::UpToDate);
    };

    if !prompter.is_interactive() {
        info!(
            current = %descriptor.wordpress.tag,
            available = %newest.tag,
            "a newer WordPress release is available; run `wpdev update --wordpress {}`",
            newest.tag
        );
        return Ok(Advice::Skipped(newest));
    }

    let current = descriptor.wordpress.tag.clone();
    let options = vec![
        format!("Upgrade to WordPress {}", newest.tag),
        format!("Keep WordPress {}", current),
        format!("Keep WordPress {} and don't ask again", current),
    ];
    let choice = prompter.select(
        &format!(
            "WordPress {} is available (this environment uses {}). What would you like to do?",
            newest.tag, current
        ),
        &options,
        0,
    )?;

    Ok(match choice {
        0 => {
            descriptor.wordpress = WordPressSource::image(&newest.tag, Some(&newest.reference));
            Advice::Upgraded(newest)
        }
        2 => {
            descriptor.wordpress.do_not_upgrade = Some(true);
            Advice::Silenced
        }
        _ => Advice::Declined,
    })
}
