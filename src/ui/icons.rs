//! Emoji used by the console renderers, with plain-text fallbacks for
//! terminals that cannot show them.

use console::Emoji;

// Outcomes
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static ARROW: Emoji<'_, '_> = Emoji("➡️  ", "->");

// Halts
pub static BLOCKER: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
pub static MISSING: Emoji<'_, '_> = Emoji("📭 ", "[MISSING]");

// Listings
pub static PROGRESS: Emoji<'_, '_> = Emoji("📊 ", "");
pub static FILE: Emoji<'_, '_> = Emoji("📄 ", "-");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static HINT: Emoji<'_, '_> = Emoji("💡 ", "hint:");
