use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{Address, Conversation, ConversationId, NewConversation},
};

const CONVERSATION_COLUMNS: &str =
    "conversation_id, buyer_address, seller_address, trade_id, created_at, last_message_at, last_message_preview";

pub async fn fetch_conversation(
    id: &ConversationId,
    conn: &mut SqliteConnection,
) -> Result<Option<Conversation>, SqliteDatabaseError> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE conversation_id = $1");
    let conversation = sqlx::query_as::<_, Conversation>(&sql).bind(id).fetch_optional(conn).await?;
    Ok(conversation)
}

/// Creates the conversation unless it already exists. Returns the stored record and whether it was created by this
/// call. Concurrent callers race on the primary key, so exactly one of them sees `true`.
pub async fn idempotent_insert(
    conversation: NewConversation,
    conn: &mut SqliteConnection,
) -> Result<(Conversation, bool), SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            INSERT INTO conversations (conversation_id, buyer_address, seller_address, trade_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (conversation_id) DO NOTHING
        "#,
    )
    .bind(&conversation.conversation_id)
    .bind(&conversation.buyer_address)
    .bind(&conversation.seller_address)
    .bind(&conversation.trade_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    let created = result.rows_affected() == 1;
    let stored = fetch_conversation(&conversation.conversation_id, conn)
        .await?
        .ok_or_else(|| SqliteDatabaseError::NotFound(conversation.conversation_id.to_string()))?;
    Ok((stored, created))
}

pub async fn fetch_conversations_for_address(
    address: &Address,
    conn: &mut SqliteConnection,
) -> Result<Vec<Conversation>, SqliteDatabaseError> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE buyer_address = $1 OR seller_address = $1 ORDER BY \
         COALESCE(last_message_at, created_at) DESC"
    );
    let conversations = sqlx::query_as::<_, Conversation>(&sql).bind(address).fetch_all(conn).await?;
    Ok(conversations)
}

pub async fn touch_conversation(
    id: &ConversationId,
    at: DateTime<Utc>,
    preview: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE conversations SET last_message_at = $1, last_message_preview = $2 WHERE conversation_id = $3",
    )
    .bind(at)
    .bind(preview)
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::NotFound(format!("Conversation {id}")));
    }
    Ok(())
}
