pub mod autoplay;
pub mod chart;
pub mod chart_cache;
pub mod display_filter;
pub mod gameplay;
pub mod judgment;
pub mod life;
pub mod midi;
pub mod note;
pub mod scores;
pub mod script;
pub mod session;
pub mod tracks;
