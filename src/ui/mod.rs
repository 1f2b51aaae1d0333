pub mod icons;
pub mod output;
pub mod theme;

pub use icons::Icons;
pub use output::{error, header, info, muted, section, success, summary_row, timing, warn};
pub use theme::{theme, Theme};
