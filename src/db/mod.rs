mod migrations;
mod models;
mod period;
mod store;

pub use models::{
    Article, ArticleTriage, Briefing, ResearchPriority, SourceReference, Stats, Storyline,
    StorylineNarrative, TriageStats,
};
pub use period::{format_period_display, make_period_id, period_end_date, today};
pub use store::Store;
