use crate::config::ComposerConfig;

/// Builds the final model input from retrieved context, optional
/// session-only content and the user's prompt.
#[derive(Debug, Clone, Default)]
pub struct AugmentationComposer {
    config: ComposerConfig,
}

impl AugmentationComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    /// The framing is always emitted, even when there is nothing to reference.
    pub fn compose(&self, user_prompt: &str, retrieved: &[String], temporary: Option<&str>) -> String {
        let mut context = retrieved.join("\n");

        if let Some(content) = temporary.filter(|c| !c.is_empty()) {
            context.push('\n');
            context.push_str(&self.config.temporary_heading);
            context.push('\n');
            context.push_str(content);
        }

        format!(
            "{}\n{}\n\n{}{}",
            self.config.reference_preamble, context, self.config.question_label, user_prompt
        )
    }
}
