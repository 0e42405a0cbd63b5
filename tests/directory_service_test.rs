mod common;

use common::{seed_note, seed_user, TestContext};

#[tokio::test]
async fn assignable_users_excludes_hidden_accounts() {
    let ctx = TestContext::new().await;
    seed_user(&ctx.db, "Zoe", true).await;
    seed_user(&ctx.db, "Adam", true).await;
    seed_user(&ctx.db, "Ghost", false).await;

    let users = ctx.directory.list_assignable_users().await.unwrap();
    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Adam", "Zoe"]);
}

#[tokio::test]
async fn readers_see_public_notes_and_their_own() {
    let ctx = TestContext::new().await;
    let author = seed_user(&ctx.db, "Author", true).await;
    let reader = seed_user(&ctx.db, "Reader", true).await;

    seed_note(&ctx.db, author.id, "shared update", true).await;
    seed_note(&ctx.db, author.id, "private draft", false).await;
    seed_note(&ctx.db, reader.id, "my own private note", false).await;

    let visible = ctx.directory.list_notes_for(reader.id).await.unwrap();
    let bodies: Vec<&str> = visible.iter().map(|n| n.body.as_str()).collect();
    assert_eq!(bodies.len(), 2);
    assert!(bodies.contains(&"shared update"));
    assert!(bodies.contains(&"my own private note"));
}
