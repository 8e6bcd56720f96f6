use crate::db::handle::Database;
use crate::db::models::{
    AvatarConfig, AvatarConfigInput, Conversation, DEFAULT_PERSONALITY, Direction, JsonMap,
    NewConversation, NewUser, QueryOptions, User, Value, WriteResult, encode_json,
};
use crate::db::schema::{Column, Table};
use crate::error::StoreError;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Default page size for conversation history.
pub const DEFAULT_CONVERSATION_LIMIT: u32 = 50;

/// Typed entry points for the UI and chat layers. Every read goes back to the
/// store; nothing is cached between calls.
#[derive(Clone)]
pub struct Repository {
    db: Database,
}

impl Repository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let store = self.db.store().await?;
        store
            .get(Table::Users, &vec![(Column::Username, Value::from(username))])
            .await?
            .map(User::try_from)
            .transpose()
    }

    pub async fn create_user(&self, user: NewUser) -> Result<WriteResult, StoreError> {
        if user.username.trim().is_empty() {
            return Err(StoreError::ValidationError("username is required".to_string()));
        }
        let settings = encode_json(Table::Users, Column::Settings, &user.settings)?;
        let store = self.db.store().await?;
        store
            .insert(
                Table::Users,
                &vec![
                    (Column::Username, Value::from(user.username)),
                    (Column::PasswordHash, Value::from(user.password_hash)),
                    (Column::Email, Value::from(user.email)),
                    (Column::CreatedAt, Value::from(Utc::now())),
                    (Column::Settings, settings),
                ],
            )
            .await
    }

    /// Stamp `last_login` with the current time. Returns whether the user exists.
    pub async fn record_login(&self, user_id: i64) -> Result<bool, StoreError> {
        let store = self.db.store().await?;
        let res = store
            .update(
                Table::Users,
                &vec![(Column::LastLogin, Value::from(Utc::now()))],
                &vec![(Column::Id, Value::from(user_id))],
            )
            .await?;
        Ok(res.changes > 0)
    }

    pub async fn get_user_settings(&self, user_id: i64) -> Result<Option<JsonValue>, StoreError> {
        let store = self.db.store().await?;
        let Some(record) = store
            .get(Table::Users, &vec![(Column::Id, Value::from(user_id))])
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(
            record
                .json(Column::Settings)?
                .unwrap_or_else(|| JsonValue::Object(JsonMap::new())),
        ))
    }

    pub async fn update_user_settings(
        &self,
        user_id: i64,
        settings: &JsonValue,
    ) -> Result<bool, StoreError> {
        let encoded = encode_json(Table::Users, Column::Settings, settings)?;
        let store = self.db.store().await?;
        let res = store
            .update(
                Table::Users,
                &vec![(Column::Settings, encoded)],
                &vec![(Column::Id, Value::from(user_id))],
            )
            .await?;
        Ok(res.changes > 0)
    }

    /// Most recent conversations first, at most `limit` of them.
    pub async fn get_conversations(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Conversation>, StoreError> {
        let store = self.db.store().await?;
        let options = QueryOptions::default()
            .order_by(Column::Timestamp, Direction::Desc)
            .order_by(Column::Id, Direction::Desc)
            .limit(limit);
        store
            .all(
                Table::Conversations,
                &vec![(Column::UserId, Value::from(user_id))],
                &options,
            )
            .await?
            .into_iter()
            .map(Conversation::try_from)
            .collect()
    }

    pub async fn save_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<WriteResult, StoreError> {
        let message = conversation
            .message
            .ok_or_else(|| StoreError::ValidationError("conversation message is required".to_string()))?;
        let store = self.db.store().await?;
        store
            .insert(
                Table::Conversations,
                &vec![
                    (Column::UserId, Value::from(conversation.user_id)),
                    (Column::Message, Value::from(message)),
                    (Column::Response, Value::from(conversation.response)),
                    (
                        Column::Personality,
                        Value::from(
                            conversation
                                .personality
                                .unwrap_or_else(|| DEFAULT_PERSONALITY.to_string()),
                        ),
                    ),
                    (
                        Column::Timestamp,
                        Value::from(conversation.timestamp.unwrap_or_else(Utc::now)),
                    ),
                ],
            )
            .await
    }

    /// Drop a user's whole history. Retention policy belongs to the caller.
    pub async fn clear_conversations(&self, user_id: i64) -> Result<u64, StoreError> {
        let store = self.db.store().await?;
        let res = store
            .delete(
                Table::Conversations,
                &vec![(Column::UserId, Value::from(user_id))],
            )
            .await?;
        Ok(res.changes)
    }

    /// `None` when the key was never set; `Some(Null)` when it was set to null.
    pub async fn get_setting(
        &self,
        user_id: i64,
        key: &str,
    ) -> Result<Option<JsonValue>, StoreError> {
        let store = self.db.store().await?;
        let Some(record) = store
            .get(Table::Settings, &setting_key(user_id, key))
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(record.json(Column::Value)?.unwrap_or(JsonValue::Null)))
    }

    /// Like [`Repository::get_setting`], decoded into `T`. A stored value of the
    /// wrong shape is reported as corrupt.
    pub async fn get_setting_as<T: DeserializeOwned>(
        &self,
        user_id: i64,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.get_setting(user_id, key)
            .await?
            .map(|v| {
                serde_json::from_value(v).map_err(|e| {
                    StoreError::corrupt(Table::Settings.as_str(), Column::Value.as_str(), e)
                })
            })
            .transpose()
    }

    /// Last write wins; at most one row per `(user_id, key)`.
    pub async fn set_setting<T: Serialize + ?Sized>(
        &self,
        user_id: i64,
        key: &str,
        value: &T,
    ) -> Result<WriteResult, StoreError> {
        let encoded = encode_json(Table::Settings, Column::Value, value)?;
        let store = self.db.store().await?;
        store
            .upsert(
                Table::Settings,
                &vec![
                    (Column::Value, encoded),
                    (Column::UpdatedAt, Value::from(Utc::now())),
                ],
                &setting_key(user_id, key),
            )
            .await
    }

    pub async fn delete_setting(&self, user_id: i64, key: &str) -> Result<bool, StoreError> {
        let store = self.db.store().await?;
        let res = store
            .delete(Table::Settings, &setting_key(user_id, key))
            .await?;
        Ok(res.changes > 0)
    }

    pub async fn get_avatar_config(&self, user_id: i64) -> Result<Option<AvatarConfig>, StoreError> {
        let store = self.db.store().await?;
        store
            .get(
                Table::AvatarConfigs,
                &vec![(Column::UserId, Value::from(user_id))],
            )
            .await?
            .map(AvatarConfig::try_from)
            .transpose()
    }

    /// Replace the user's avatar config as a unit.
    pub async fn save_avatar_config(
        &self,
        user_id: i64,
        config: AvatarConfigInput,
    ) -> Result<WriteResult, StoreError> {
        let table = Table::AvatarConfigs;
        let expressions = encode_json(
            table,
            Column::Expressions,
            &config.expressions.unwrap_or_default(),
        )?;
        let animations = encode_json(
            table,
            Column::Animations,
            &config.animations.unwrap_or_default(),
        )?;
        let lighting = encode_json(table, Column::Lighting, &config.lighting.unwrap_or_default())?;

        let store = self.db.store().await?;
        store
            .upsert(
                table,
                &vec![
                    (Column::ModelPath, Value::from(config.model_path)),
                    (Column::Expressions, expressions),
                    (Column::Animations, animations),
                    (Column::Lighting, lighting),
                ],
                &vec![(Column::UserId, Value::from(user_id))],
            )
            .await
    }
}

fn setting_key(user_id: i64, key: &str) -> Vec<(Column, Value)> {
    vec![
        (Column::UserId, Value::from(user_id)),
        (Column::Key, Value::from(key)),
    ]
}
