use chirp::config::{Config, StoreBackend};
use chirp::service::Services;
use chirp::store::{MemoryStore, ScyllaStore, Store};
use chirp::ErrorKind;
use fake::faker::internet::en::Username;
use fake::faker::lorem::en::{Sentence, Word};
use fake::Fake;
use rand::seq::SliceRandom;
use rand::Rng;
use std::error::Error;
use std::sync::Arc;

const PASSWORD: &str = "password123";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env();
    println!("Starting data seeding...");

    let store: Arc<dyn Store> = match config.store {
        StoreBackend::Scylla => {
            let session = chirp::db::create_session(&config.scylla_node, &config.keyspace).await?;
            Arc::new(ScyllaStore::new(Arc::new(session)))
        }
        StoreBackend::Memory => {
            println!("CHIRP_STORE=memory: seeded data is discarded on exit");
            Arc::new(MemoryStore::new())
        }
    };
    let services = Services::new(store, config.bcrypt_cost);

    let num_users = 100;
    let posts_per_user = 20;
    let follows_per_user = 10;

    let users = seed_users(&services, num_users).await?;
    seed_posts(&services, &users, posts_per_user).await?;
    seed_follows(&services, &users, follows_per_user).await?;

    println!("Seeding completed!");
    Ok(())
}

async fn seed_users(services: &Services, count: usize) -> Result<Vec<i64>, Box<dyn Error>> {
    println!("Creating {} users...", count);
    let mut users = Vec::new();

    while users.len() < count {
        let username: String = Username().fake();
        match services.users.register(&username, PASSWORD).await {
            Ok(user) => {
                users.push(user.id);
                println!(
                    "Created user {}/{}: {} ({})",
                    users.len(),
                    count,
                    username,
                    user.id
                );
            }
            // Generated names collide now and then, and some are too short.
            Err(e) if matches!(e.kind(), ErrorKind::Conflict | ErrorKind::InvalidInput) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(users)
}

async fn seed_posts(
    services: &Services,
    users: &[i64],
    posts_per_user: usize,
) -> Result<(), Box<dyn Error>> {
    println!("Creating {} posts per user...", posts_per_user);
    let total_posts = users.len() * posts_per_user;
    let mut current_post = 0;

    for &user_id in users {
        for _ in 0..posts_per_user {
            let content = post_content();
            services.posts.create(user_id, &content).await?;

            current_post += 1;
            if current_post % 100 == 0 {
                println!("Created {}/{} posts", current_post, total_posts);
            }
        }
    }

    Ok(())
}

async fn seed_follows(
    services: &Services,
    users: &[i64],
    follows_per_user: usize,
) -> Result<(), Box<dyn Error>> {
    println!("Creating {} follows per user...", follows_per_user);

    for &follower in users {
        let targets: Vec<i64> = users
            .choose_multiple(&mut rand::thread_rng(), follows_per_user + 1)
            .copied()
            .filter(|&id| id != follower)
            .take(follows_per_user)
            .collect();
        for following in targets {
            services.follows.follow(follower, following).await?;
        }
    }

    Ok(())
}

/// A short sentence with up to two hashtags appended.
fn post_content() -> String {
    let mut content: String = Sentence(3..10).fake();
    let tags = rand::thread_rng().gen_range(0..=2);
    for _ in 0..tags {
        let word: String = Word().fake();
        content.push_str(&format!(" #{}", word));
    }
    content.chars().take(chirp::models::MAX_POST_CHARS).collect()
}
