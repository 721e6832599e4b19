//! Shared UI icons with plain-text fallbacks.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "* ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN] ");

// Agent activity
pub static THINKING: Emoji<'_, '_> = Emoji("💭 ", "");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY] ");

// Listings
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static MONEY: Emoji<'_, '_> = Emoji("💰 ", "$ ");
