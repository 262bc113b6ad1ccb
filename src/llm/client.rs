use crate::config::Config;
use crate::llm::Question;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageUrlArgs,
    },
    Client,
};
use base64::Engine as _;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AiError {
    /// The backend answered with no usable content.
    #[error("AI backend returned an empty answer")]
    EmptyAnswer,
    #[error("AI request failed: {0}")]
    Backend(#[from] async_openai::error::OpenAIError),
}

const IMAGE_ANALYSIS_PROMPT: &str = "Analyze this screenshot with SillyTavern in mind. \
If it shows an error, name the error type and likely fixes. If it shows a settings page, \
point out the important options. If it shows a chat, describe what might be going wrong.";

pub struct AiClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    system_prompt: String,
}

impl AiClient {
    pub fn new(config: &Config) -> Self {
        let mut api_config = OpenAIConfig::new().with_api_base(&config.api_base);
        if let Some(key) = &config.api_key {
            api_config = api_config.with_api_key(key);
        } else {
            api_config = api_config.with_api_key("unused");
        }

        Self {
            client: Client::with_config(api_config),
            model: config.api_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
        }
    }

    /// Answers a resolved question. A `Combined` or `Image` request ships the
    /// screenshot as a base64 data URL alongside the text.
    pub async fn answer(&self, request: &Question) -> Result<String, AiError> {
        let user_message = match request {
            Question::Text { question } => ChatCompletionRequestUserMessageArgs::default()
                .content(question.clone())
                .build()?
                .into(),
            Question::Image { image, question } | Question::Combined { image, question } => {
                let prompt = if question.trim().is_empty() {
                    IMAGE_ANALYSIS_PROMPT.to_string()
                } else {
                    format!("{IMAGE_ANALYSIS_PROMPT}\n\nUser question: {question}")
                };
                self.vision_message(image, &prompt)?
            }
        };

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_prompt.clone())
                .build()?
                .into(),
            user_message,
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(chat_request).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(AiError::EmptyAnswer);
        }

        info!(model = %self.model, image = request.has_image(), "AI answer generated");
        Ok(content)
    }

    fn vision_message(
        &self,
        image: &[u8],
        prompt: &str,
    ) -> Result<ChatCompletionRequestMessage, AiError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:image/png;base64,{encoded}");

        let text_part: ChatCompletionRequestUserMessageContentPart =
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(prompt)
                .build()?
                .into();
        let image_part: ChatCompletionRequestUserMessageContentPart =
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(ImageUrlArgs::default().url(data_url).build()?)
                .build()?
                .into();

        Ok(ChatCompletionRequestUserMessageArgs::default()
            .content(vec![text_part, image_part])
            .build()?
            .into())
    }
}
