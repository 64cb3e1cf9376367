//! Text utilities applied to translations before they are written back.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`tags`]    | Protect, restore and repair inline control tags |
//! | [`shaping`] | Arabic presentation forms and visual reordering |

pub mod shaping;
pub mod tags;

use crate::config::PatchOptions;

/// Prepare a translation for writing over `source`: bracket and tag
/// repair when [`PatchOptions::repair_tags`] is set, then shaping when
/// [`PatchOptions::shape`] is.
pub fn prepare(source: &str, translation: &str, options: &PatchOptions) -> String {
    let mut text = translation.to_owned();
    if options.repair_tags {
        text = tags::fix_brackets_strict(source, &text);
        text = tags::restore_tags_locally(source, &text);
    }
    if options.shape {
        text = shaping::shape(&text);
    }
    text
}
