use scylla::{Session, SessionBuilder};
use std::error::Error;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (id bigint PRIMARY KEY, username text, password_hash text, role text, created_at timestamp, updated_at timestamp)",
    "CREATE TABLE IF NOT EXISTS users_by_username (username text PRIMARY KEY, id bigint)",
    "CREATE TABLE IF NOT EXISTS posts (id bigint PRIMARY KEY, author_id bigint, content text, hashtags set<text>, created_at timestamp, updated_at timestamp)",
    "CREATE INDEX IF NOT EXISTS posts_author_idx ON posts (author_id)",
    "CREATE TABLE IF NOT EXISTS follows (follower_id bigint, following_id bigint, created_at timestamp, PRIMARY KEY (follower_id, following_id))",
];

pub async fn create_session(node: &str, keyspace: &str) -> Result<Session, Box<dyn Error>> {
    let session = SessionBuilder::new().known_node(node).build().await?;

    session
        .query(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                keyspace
            ),
            &[],
        )
        .await?;
    session.use_keyspace(keyspace, false).await?;

    for statement in SCHEMA {
        session.query(*statement, &[]).await?;
    }

    Ok(session)
}
