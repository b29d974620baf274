pub mod prompt;
pub mod registry;

pub use prompt::PromptScorer;
pub use registry::build_scorers;
