use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{Address, ConversationId, HistoryOrder, Message, MessageBody, NewMessage},
};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_address, recipient_address, plain_text, is_encrypted, \
                               encrypted_payload, encryption_metadata, created_at, read_at";

pub async fn insert_message(message: NewMessage, conn: &mut SqliteConnection) -> Result<Message, SqliteDatabaseError> {
    let (plain_text, is_encrypted, payload, metadata) = match message.body {
        MessageBody::Plain { text } => (text, false, None, None),
        MessageBody::Encrypted { payload, metadata } => (String::new(), true, Some(payload), Some(metadata)),
    };
    let sql = format!(
        "INSERT INTO messages (conversation_id, sender_address, recipient_address, plain_text, is_encrypted, \
         encrypted_payload, encryption_metadata, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING \
         {MESSAGE_COLUMNS}"
    );
    let message = sqlx::query_as::<_, Message>(&sql)
        .bind(message.conversation_id)
        .bind(message.sender_address)
        .bind(message.recipient_address)
        .bind(plain_text)
        .bind(is_encrypted)
        .bind(payload)
        .bind(metadata)
        .bind(message.created_at)
        .fetch_one(conn)
        .await?;
    Ok(message)
}

pub async fn fetch_message(id: i64, conn: &mut SqliteConnection) -> Result<Option<Message>, SqliteDatabaseError> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
    let message = sqlx::query_as::<_, Message>(&sql).bind(id).fetch_optional(conn).await?;
    Ok(message)
}

/// Message ids are assigned in insertion order, so ordering by id is ordering by acceptance.
pub async fn fetch_messages(
    id: &ConversationId,
    limit: i64,
    offset: i64,
    order: HistoryOrder,
    conn: &mut SqliteConnection,
) -> Result<Vec<Message>, SqliteDatabaseError> {
    let direction = match order {
        HistoryOrder::OldestFirst => "ASC",
        HistoryOrder::NewestFirst => "DESC",
    };
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 ORDER BY id {direction} LIMIT $2 OFFSET $3"
    );
    let messages = sqlx::query_as::<_, Message>(&sql).bind(id).bind(limit).bind(offset).fetch_all(conn).await?;
    Ok(messages)
}

pub async fn mark_read(
    id: i64,
    recipient: &Address,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result =
        sqlx::query("UPDATE messages SET read_at = $1 WHERE id = $2 AND recipient_address = $3 AND read_at IS NULL")
            .bind(at)
            .bind(id)
            .bind(recipient)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() == 1)
}
