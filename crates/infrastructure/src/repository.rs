use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    BusinessDirectory, BusinessId, ChatRoom, ChatRoomId, ChatRoomOverview, ChatRoomRepository,
    Message, MessageContent, MessageId, MessageRepository, RepositoryError, UserDirectory, UserId,
    UserIdentity, UserRole,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    role: String,
    is_active: bool,
}

impl TryFrom<UserRecord> for UserIdentity {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let role = value
            .role
            .to_ascii_lowercase()
            .parse::<UserRole>()
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(UserIdentity {
            id: UserId::from(value.id),
            role,
            is_active: value.is_active,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    business_id: Uuid,
    initiator_id: Uuid,
    created_at: DateTime<Utc>,
    last_message_at: Option<DateTime<Utc>>,
}

impl RoomRecord {
    fn into_room(self, participants: impl IntoIterator<Item = Uuid>) -> ChatRoom {
        ChatRoom {
            id: ChatRoomId::from(self.id),
            business_id: BusinessId::from(self.business_id),
            initiator_id: UserId::from(self.initiator_id),
            participants: participants.into_iter().map(UserId::from).collect(),
            created_at: self.created_at,
            last_message_at: self.last_message_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    chat_room_id: Uuid,
    user_id: Uuid,
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    chat_room_id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
    is_read: bool,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;

        Ok(Message {
            id: MessageId::from(value.id),
            chat_room_id: ChatRoomId::from(value.chat_room_id),
            sender_id: UserId::from(value.sender_id),
            receiver_id: UserId::from(value.receiver_id),
            content,
            created_at: value.created_at,
            is_read: value.is_read,
        })
    }
}

const MESSAGE_COLUMNS: &str =
    "id, chat_room_id, sender_id, receiver_id, content, created_at, is_read";

/// 批量读取若干会话的参与者
async fn load_participants(
    pool: &PgPool,
    room_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Uuid>>, RepositoryError> {
    let records = sqlx::query_as::<_, ParticipantRecord>(
        r#"
        SELECT chat_room_id, user_id
        FROM chat_room_participants
        WHERE chat_room_id = ANY($1)
        "#,
    )
    .bind(room_ids)
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_err)?;

    let mut participants: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for record in records {
        participants
            .entry(record.chat_room_id)
            .or_default()
            .push(record.user_id);
    }
    Ok(participants)
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_identity(&self, id: UserId) -> Result<Option<UserIdentity>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, role, is_active
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(UserIdentity::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgBusinessDirectory {
    pool: PgPool,
}

impl PgBusinessDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BusinessDirectory for PgBusinessDirectory {
    async fn find_owner(&self, business_id: BusinessId) -> Result<Option<UserId>, RepositoryError> {
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT owner_id FROM businesses WHERE id = $1")
                .bind(Uuid::from(business_id))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        Ok(owner.map(UserId::from))
    }
}

#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_participants(&self, record: RoomRecord) -> Result<ChatRoom, RepositoryError> {
        let mut participants = load_participants(&self.pool, &[record.id]).await?;
        let members = participants.remove(&record.id).unwrap_or_default();
        Ok(record.into_room(members))
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn find_by_business_and_participant(
        &self,
        business_id: BusinessId,
        user_id: UserId,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT r.id, r.business_id, r.initiator_id, r.created_at, r.last_message_at
            FROM chat_rooms r
            JOIN chat_room_participants p ON p.chat_room_id = r.id
            WHERE r.business_id = $1 AND p.user_id = $2
            ORDER BY r.created_at ASC
            LIMIT 1
            "#,
        )
        .bind(Uuid::from(business_id))
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => Ok(Some(self.attach_participants(record).await?)),
            None => Ok(None),
        }
    }

    async fn find_for_participant(
        &self,
        id: ChatRoomId,
        user_id: UserId,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT r.id, r.business_id, r.initiator_id, r.created_at, r.last_message_at
            FROM chat_rooms r
            JOIN chat_room_participants p ON p.chat_room_id = r.id
            WHERE r.id = $1 AND p.user_id = $2
            "#,
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => Ok(Some(self.attach_participants(record).await?)),
            None => Ok(None),
        }
    }

    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO chat_rooms (id, business_id, initiator_id, created_at, last_message_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, business_id, initiator_id, created_at, last_message_at
            "#,
        )
        .bind(Uuid::from(room.id))
        .bind(Uuid::from(room.business_id))
        .bind(Uuid::from(room.initiator_id))
        .bind(room.created_at)
        .bind(room.last_message_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let participants: Vec<Uuid> = room.participants.iter().copied().map(Uuid::from).collect();
        sqlx::query(
            r#"
            INSERT INTO chat_room_participants (chat_room_id, user_id)
            SELECT $1, user_id FROM UNNEST($2::uuid[]) AS t(user_id)
            "#,
        )
        .bind(record.id)
        .bind(&participants)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(record.into_room(participants))
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ChatRoomOverview>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT r.id, r.business_id, r.initiator_id, r.created_at, r.last_message_at
            FROM chat_rooms r
            JOIN chat_room_participants p ON p.chat_room_id = r.id
            WHERE p.user_id = $1
            ORDER BY r.last_message_at DESC NULLS LAST, r.created_at DESC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if records.is_empty() {
            return Ok(Vec::new());
        }

        let room_ids: Vec<Uuid> = records.iter().map(|record| record.id).collect();
        let mut participants = load_participants(&self.pool, &room_ids).await?;

        let latest = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT DISTINCT ON (chat_room_id) {MESSAGE_COLUMNS}
            FROM messages
            WHERE chat_room_id = ANY($1)
            ORDER BY chat_room_id, created_at DESC, seq DESC
            "#
        ))
        .bind(&room_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut last_messages: HashMap<Uuid, Message> = HashMap::new();
        for record in latest {
            let room_id = record.chat_room_id;
            last_messages.insert(room_id, Message::try_from(record)?);
        }

        Ok(records
            .into_iter()
            .map(|record| {
                let id = record.id;
                let members = participants.remove(&id).unwrap_or_default();
                ChatRoomOverview {
                    room: record.into_room(members),
                    last_message: last_messages.remove(&id),
                }
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages (id, chat_room_id, sender_id, receiver_id, content, created_at, is_read, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $6)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.chat_room_id))
        .bind(Uuid::from(message.sender_id))
        .bind(Uuid::from(message.receiver_id))
        .bind(message.content.as_str())
        .bind(message.created_at)
        .bind(message.is_read)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let updated = sqlx::query(
            r#"
            UPDATE chat_rooms
            SET last_message_at = GREATEST(COALESCE(last_message_at, $2), $2)
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(message.chat_room_id))
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Message::try_from(record)
    }

    async fn list_page(
        &self,
        chat_room_id: ChatRoomId,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE chat_room_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(Uuid::from(chat_room_id))
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn mark_read(
        &self,
        chat_room_id: ChatRoomId,
        receiver_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, updated_at = NOW()
            WHERE chat_room_id = $1 AND receiver_id = $2 AND NOT is_read
            "#,
        )
        .bind(Uuid::from(chat_room_id))
        .bind(Uuid::from(receiver_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

/// PostgreSQL 上的全部仓储
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_directory: Arc<PgUserDirectory>,
    pub business_directory: Arc<PgBusinessDirectory>,
    pub room_repository: Arc<PgChatRoomRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_directory: Arc::new(PgUserDirectory::new(pool.clone())),
            business_directory: Arc::new(PgBusinessDirectory::new(pool.clone())),
            room_repository: Arc::new(PgChatRoomRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
