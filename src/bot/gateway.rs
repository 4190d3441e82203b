//! Discord implementation of the messaging gateway.
//!
//! Users are reached through their DM channel, the admin channel by id. Discord has no native
//! "copy message", so a copy re-posts the content and embeds of the source and links its
//! attachments.

use crate::gateway::{Action, ActionStyle, ChatId, GatewayError, MessageRef, MessagingGateway};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Buttons per action row allowed by Discord.
const BUTTONS_PER_ROW: usize = 5;

/// HTTP status Discord answers with when a user does not accept DMs from the bot.
const FORBIDDEN: u16 = 403;

/// [`MessagingGateway`] over the serenity HTTP client.
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<serenity::Http>,
}

impl SerenityGateway {
    /// Wraps the client's HTTP handle.
    #[must_use]
    pub const fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    async fn channel_for(&self, chat: ChatId) -> Result<serenity::ChannelId, GatewayError> {
        match chat {
            ChatId::Channel(id) => Ok(serenity::ChannelId::new(non_zero(id)?)),
            ChatId::User(id) => {
                let user = serenity::UserId::new(non_zero(id)?);
                let dm = user
                    .create_dm_channel(&self.http)
                    .await
                    .map_err(|e| map_error(id, &e))?;
                Ok(dm.id)
            }
        }
    }

    async fn post(
        &self,
        chat: ChatId,
        message: serenity::CreateMessage,
    ) -> Result<MessageRef, GatewayError> {
        let channel = self.channel_for(chat).await?;
        let sent = channel
            .send_message(&self.http, message)
            .await
            .map_err(|e| map_error(recipient(chat), &e))?;
        Ok(MessageRef {
            channel_id: sent.channel_id.get(),
            message_id: sent.id.get(),
        })
    }
}

const fn recipient(chat: ChatId) -> u64 {
    match chat {
        ChatId::User(id) | ChatId::Channel(id) => id,
    }
}

fn non_zero(id: u64) -> Result<u64, GatewayError> {
    if id == 0 {
        return Err(GatewayError::Unreachable { recipient: id });
    }
    Ok(id)
}

fn map_error(recipient: u64, error: &serenity::Error) -> GatewayError {
    if let serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) = error {
        if response.status_code.as_u16() == FORBIDDEN {
            return GatewayError::Unreachable { recipient };
        }
    }
    GatewayError::Transport(error.to_string())
}

fn message_ids(message: MessageRef) -> Result<(serenity::ChannelId, serenity::MessageId), GatewayError> {
    Ok((
        serenity::ChannelId::new(non_zero(message.channel_id)?),
        serenity::MessageId::new(non_zero(message.message_id)?),
    ))
}

/// Converts actions into Discord button rows.
#[must_use]
pub fn action_rows(actions: &[Action]) -> Vec<serenity::CreateActionRow> {
    actions
        .chunks(BUTTONS_PER_ROW)
        .map(|chunk| {
            let buttons = chunk
                .iter()
                .map(|action| match action {
                    Action::Callback { id, label, style } => serenity::CreateButton::new(id)
                        .label(label)
                        .style(match style {
                            ActionStyle::Success => serenity::ButtonStyle::Success,
                            ActionStyle::Danger => serenity::ButtonStyle::Danger,
                            ActionStyle::Primary => serenity::ButtonStyle::Primary,
                        }),
                    Action::Link { url, label } => serenity::CreateButton::new_link(url).label(label),
                })
                .collect();
            serenity::CreateActionRow::Buttons(buttons)
        })
        .collect()
}

#[async_trait]
impl MessagingGateway for SerenityGateway {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef, GatewayError> {
        self.post(chat, serenity::CreateMessage::new().content(text))
            .await
    }

    async fn send_with_actions(
        &self,
        chat: ChatId,
        text: &str,
        actions: &[Action],
    ) -> Result<MessageRef, GatewayError> {
        self.post(
            chat,
            serenity::CreateMessage::new()
                .content(text)
                .components(action_rows(actions)),
        )
        .await
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        photo: &str,
        caption: &str,
        actions: &[Action],
    ) -> Result<MessageRef, GatewayError> {
        let mut message = serenity::CreateMessage::new()
            .content(caption)
            .components(action_rows(actions));
        if !photo.is_empty() {
            message = message.embed(serenity::CreateEmbed::new().image(photo));
        }
        self.post(chat, message).await
    }

    async fn send_document(
        &self,
        chat: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<MessageRef, GatewayError> {
        self.post(
            chat,
            serenity::CreateMessage::new()
                .content(caption)
                .add_file(serenity::CreateAttachment::bytes(bytes, file_name)),
        )
        .await
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), GatewayError> {
        let (channel, id) = message_ids(message)?;
        channel
            .edit_message(
                &self.http,
                id,
                serenity::EditMessage::new()
                    .content(text)
                    .components(Vec::new()),
            )
            .await
            .map_err(|e| map_error(message.channel_id, &e))?;
        Ok(())
    }

    async fn delete(&self, message: MessageRef) -> Result<(), GatewayError> {
        let (channel, id) = message_ids(message)?;
        channel
            .delete_message(&self.http, id)
            .await
            .map_err(|e| map_error(message.channel_id, &e))
    }

    async fn copy_message(
        &self,
        to: ChatId,
        source: MessageRef,
    ) -> Result<MessageRef, GatewayError> {
        let (channel, id) = message_ids(source)?;
        let original = channel
            .message(&self.http, id)
            .await
            .map_err(|e| map_error(source.channel_id, &e))?;

        let mut content = original.content.clone();
        for attachment in &original.attachments {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&attachment.url);
        }

        let embeds = original
            .embeds
            .into_iter()
            .map(serenity::CreateEmbed::from)
            .collect();
        self.post(
            to,
            serenity::CreateMessage::new().content(content).embeds(embeds),
        )
        .await
    }
}
