use jotter::config::PostsConfig;
use jotter::models::{CreatePost, PostFilter, PostOrdering, TagsInput, UpdatePost};
use jotter::services::posts::{self, PostError};
use jotter::services::{auth, ValidationError};
use jotter::{Config, Database};

fn create_test_db() -> Database {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let id: u32 = rng.gen();
    let name = format!("test_db_{}", id);

    let db = Database::open_memory(&name).expect("Failed to create test database");
    db.migrate().expect("Failed to run migrations");
    db
}

// Valid test passwords that meet requirements: 8+ chars, uppercase, lowercase, number
const TEST_PASSWORD: &str = "Password123";
const WRONG_PASSWORD: &str = "WrongPass456";
const NEW_PASSWORD: &str = "NewPass456";

fn create_author(db: &Database) -> i64 {
    auth::create_user(db, "editor", "editor@example.com", TEST_PASSWORD, true)
        .expect("Failed to create user")
}

fn new_post(title: &str) -> CreatePost {
    CreatePost {
        title: title.to_string(),
        slug: None,
        content: format!("Body of {}", title),
        summary: None,
        published: true,
        featured_image: None,
        tags: TagsInput::default(),
    }
}

fn published_only() -> PostFilter {
    PostFilter {
        published: Some(true),
        ..PostFilter::default()
    }
}

mod auth_integration_tests {
    use super::*;

    #[test]
    fn test_create_and_authenticate_user() {
        let db = create_test_db();

        let user_id = auth::create_user(&db, "testuser", "test@example.com", TEST_PASSWORD, false)
            .expect("Failed to create user");
        assert!(user_id > 0);

        let user = auth::authenticate(&db, "testuser", TEST_PASSWORD)
            .expect("Authentication error")
            .expect("User should be found");
        assert_eq!(user.username, "testuser");
        assert_eq!(user.email, "test@example.com");
        assert!(!user.is_staff);
    }

    #[test]
    fn test_authenticate_wrong_password() {
        let db = create_test_db();
        auth::create_user(&db, "testuser", "", TEST_PASSWORD, false).unwrap();

        let result = auth::authenticate(&db, "testuser", WRONG_PASSWORD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_authenticate_unknown_user() {
        let db = create_test_db();
        let result = auth::authenticate(&db, "nobody", TEST_PASSWORD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_duplicate_username_is_validation_error() {
        let db = create_test_db();
        auth::create_user(&db, "testuser", "", TEST_PASSWORD, false).unwrap();

        let err = auth::create_user(&db, "testuser", "", TEST_PASSWORD, false).unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
    }

    #[test]
    fn test_invalid_username_and_email_rejected() {
        let db = create_test_db();
        assert!(auth::create_user(&db, "bad name", "", TEST_PASSWORD, false).is_err());
        assert!(auth::create_user(&db, "someone", "not-an-email", TEST_PASSWORD, false).is_err());
        assert!(auth::create_user(&db, "someone", "", "weak", false).is_err());
    }

    #[test]
    fn test_token_lifecycle() {
        let db = create_test_db();
        let user_id = auth::create_user(&db, "testuser", "", TEST_PASSWORD, false).unwrap();

        let token = auth::issue_token(&db, user_id).unwrap();
        assert!(token.starts_with("jt_"));

        let user = auth::validate_token(&db, &token).unwrap().expect("token valid");
        assert_eq!(user.id, user_id);

        assert!(auth::revoke_token(&db, &token).unwrap());
        assert!(auth::validate_token(&db, &token).unwrap().is_none());
        assert!(!auth::revoke_token(&db, &token).unwrap());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let db = create_test_db();
        assert!(auth::validate_token(&db, "not-a-token").unwrap().is_none());
        assert!(auth::validate_token(&db, "jt_unknown").unwrap().is_none());
    }

    #[test]
    fn test_password_change_revokes_tokens() {
        let db = create_test_db();
        let user_id = auth::create_user(&db, "testuser", "", TEST_PASSWORD, false).unwrap();
        let token = auth::issue_token(&db, user_id).unwrap();

        assert!(auth::update_password(&db, "testuser", NEW_PASSWORD).unwrap());
        assert!(auth::validate_token(&db, &token).unwrap().is_none());
        assert!(auth::authenticate(&db, "testuser", NEW_PASSWORD)
            .unwrap()
            .is_some());
        assert!(!auth::update_password(&db, "nobody", NEW_PASSWORD).unwrap());
    }

    #[test]
    fn test_delete_user() {
        let db = create_test_db();
        auth::create_user(&db, "testuser", "", TEST_PASSWORD, false).unwrap();

        assert!(auth::delete_user(&db, "testuser").unwrap());
        assert!(!auth::delete_user(&db, "testuser").unwrap());
        assert!(auth::list_users(&db).unwrap().is_empty());
    }
}

mod post_integration_tests {
    use super::*;

    #[test]
    fn test_create_post_derives_slug_and_summary() {
        let db = create_test_db();
        let author = create_author(&db);

        let post = posts::create_post(&db, new_post("Hello World"), author, &PostsConfig::default())
            .unwrap();
        assert_eq!(post.slug, "hello-world");
        assert_eq!(post.summary, "Body of Hello World");
        assert_eq!(post.author.username, "editor");
        assert!(post.published);
    }

    #[test]
    fn test_same_title_gets_numbered_slug() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();

        let first = posts::create_post(&db, new_post("Hello World"), author, &config).unwrap();
        let second = posts::create_post(&db, new_post("Hello World"), author, &config).unwrap();
        let third = posts::create_post(&db, new_post("Hello, World!"), author, &config).unwrap();
        assert_eq!(first.slug, "hello-world");
        assert_eq!(second.slug, "hello-world-1");
        assert_eq!(third.slug, "hello-world-2");
    }

    #[test]
    fn test_chinese_title_slug() {
        let db = create_test_db();
        let author = create_author(&db);

        let post = posts::create_post(
            &db,
            new_post("Rust 基础教程"),
            author,
            &PostsConfig::default(),
        )
        .unwrap();
        assert_eq!(post.slug, "rust-ji-chu-jiao-cheng");
    }

    #[test]
    fn test_symbol_title_gets_token_slug() {
        let db = create_test_db();
        let author = create_author(&db);

        let post = posts::create_post(&db, new_post("!!!"), author, &PostsConfig::default())
            .unwrap();
        assert_eq!(post.slug.len(), 8);
        assert!(post.slug.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_reserved_words_are_skipped() {
        let db = create_test_db();
        let author = create_author(&db);

        let post = posts::create_post(&db, new_post("Drafts"), author, &PostsConfig::default())
            .unwrap();
        assert_eq!(post.slug, "drafts-1");
    }

    #[test]
    fn test_explicit_slug_rules() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();

        let mut input = new_post("Anything");
        input.slug = Some("my-custom-slug".to_string());
        let post = posts::create_post(&db, input, author, &config).unwrap();
        assert_eq!(post.slug, "my-custom-slug");

        for slug in ["my-custom-slug", "tags", "Not A Slug"] {
            let mut input = new_post("Other");
            input.slug = Some(slug.to_string());
            let err = posts::create_post(&db, input, author, &config).unwrap_err();
            assert!(matches!(err, PostError::Invalid(_)), "{}: {:?}", slug, err);
        }
    }

    #[test]
    fn test_create_post_validation() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();

        let mut blank_title = new_post("  ");
        blank_title.content = "body".to_string();
        assert!(matches!(
            posts::create_post(&db, blank_title, author, &config),
            Err(PostError::Invalid(_))
        ));

        let mut long_title = new_post(&"x".repeat(201));
        long_title.content = "body".to_string();
        assert!(matches!(
            posts::create_post(&db, long_title, author, &config),
            Err(PostError::Invalid(_))
        ));

        let mut bad_image = new_post("Image");
        bad_image.featured_image = Some("javascript:alert(1)".to_string());
        assert!(matches!(
            posts::create_post(&db, bad_image, author, &config),
            Err(PostError::Invalid(_))
        ));

        let mut long_tags = new_post("Tags");
        long_tags.tags = TagsInput::Text("t".repeat(201));
        assert!(matches!(
            posts::create_post(&db, long_tags, author, &config),
            Err(PostError::Invalid(_))
        ));
    }

    #[test]
    fn test_tags_are_normalized_on_write() {
        let db = create_test_db();
        let author = create_author(&db);

        let mut input = new_post("Tagged");
        input.tags = TagsInput::List(vec![
            "Django".to_string(),
            " vue.js".to_string(),
            "API".to_string(),
            "Django".to_string(),
        ]);
        let post = posts::create_post(&db, input, author, &PostsConfig::default()).unwrap();
        assert_eq!(post.tags, "API,Django,vue.js");
    }

    #[test]
    fn test_update_keeps_slug_unless_asked() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();
        posts::create_post(&db, new_post("Hello World"), author, &config).unwrap();

        let update = UpdatePost {
            title: Some("Completely Different".to_string()),
            ..UpdatePost::default()
        };
        let post = posts::update_post(&db, "hello-world", update, &config).unwrap();
        assert_eq!(post.slug, "hello-world");
        assert_eq!(post.title, "Completely Different");
    }

    #[test]
    fn test_update_with_empty_slug_rederives() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();
        posts::create_post(&db, new_post("Hello World"), author, &config).unwrap();

        // Same title: its own slug must not count as taken.
        let update = UpdatePost {
            slug: Some(String::new()),
            ..UpdatePost::default()
        };
        let post = posts::update_post(&db, "hello-world", update, &config).unwrap();
        assert_eq!(post.slug, "hello-world");

        let update = UpdatePost {
            title: Some("New Title".to_string()),
            slug: Some(String::new()),
            ..UpdatePost::default()
        };
        let post = posts::update_post(&db, "hello-world", update, &config).unwrap();
        assert_eq!(post.slug, "new-title");
    }

    #[test]
    fn test_update_rederive_avoids_other_posts() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();
        posts::create_post(&db, new_post("Taken"), author, &config).unwrap();
        posts::create_post(&db, new_post("Other"), author, &config).unwrap();

        let update = UpdatePost {
            title: Some("Taken".to_string()),
            slug: Some(String::new()),
            ..UpdatePost::default()
        };
        let post = posts::update_post(&db, "other", update, &config).unwrap();
        assert_eq!(post.slug, "taken-1");
    }

    #[test]
    fn test_update_explicit_slug_conflict() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();
        posts::create_post(&db, new_post("First"), author, &config).unwrap();
        posts::create_post(&db, new_post("Second"), author, &config).unwrap();

        let update = UpdatePost {
            slug: Some("first".to_string()),
            ..UpdatePost::default()
        };
        let err = posts::update_post(&db, "second", update, &config).unwrap_err();
        assert!(matches!(err, PostError::Invalid(_)));
    }

    #[test]
    fn test_update_clears_and_rederives_fields() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();
        let mut input = new_post("Pictured");
        input.featured_image = Some("https://example.com/a.png".to_string());
        input.summary = Some("Hand written".to_string());
        posts::create_post(&db, input, author, &config).unwrap();

        let update = UpdatePost {
            content: Some("Fresh body".to_string()),
            summary: Some(String::new()),
            featured_image: Some(String::new()),
            published: Some(false),
            ..UpdatePost::default()
        };
        let post = posts::update_post(&db, "pictured", update, &config).unwrap();
        assert_eq!(post.summary, "Fresh body");
        assert_eq!(post.featured_image, None);
        assert!(!post.published);
    }

    #[test]
    fn test_update_missing_post() {
        let db = create_test_db();
        let err = posts::update_post(&db, "nope", UpdatePost::default(), &PostsConfig::default())
            .unwrap_err();
        assert!(matches!(err, PostError::NotFound));
    }

    #[test]
    fn test_delete_post() {
        let db = create_test_db();
        let author = create_author(&db);
        posts::create_post(&db, new_post("Doomed"), author, &PostsConfig::default()).unwrap();

        posts::delete_post(&db, "doomed").unwrap();
        assert!(posts::get_post_by_slug(&db, "doomed").unwrap().is_none());
        assert!(matches!(
            posts::delete_post(&db, "doomed"),
            Err(PostError::NotFound)
        ));
    }

    #[test]
    fn test_deleting_author_removes_posts() {
        let db = create_test_db();
        let author = create_author(&db);
        posts::create_post(&db, new_post("Orphan"), author, &PostsConfig::default()).unwrap();

        auth::delete_user(&db, "editor").unwrap();
        assert!(posts::get_post_by_slug(&db, "orphan").unwrap().is_none());
    }
}

mod slug_retry_tests {
    use super::*;
    use jotter::services::posts::{create_post_with_lookup, with_slug_retry};
    use std::cell::Cell;

    fn slug_taken(db: &Database, candidate: &str) -> anyhow::Result<bool> {
        let conn = db.get()?;
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE slug = ?)",
            [candidate],
            |row| row.get(0),
        )?)
    }

    #[test]
    fn test_lost_race_on_insert_is_retried() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();
        posts::create_post(&db, new_post("Hello World"), author, &config).unwrap();

        // The first lookup sees a stale view, as if the row landed after the check.
        let lookups = Cell::new(0);
        let stale_once = |candidate: &str, _: Option<i64>| -> anyhow::Result<bool> {
            lookups.set(lookups.get() + 1);
            if lookups.get() == 1 {
                return Ok(false);
            }
            slug_taken(&db, candidate)
        };

        let post =
            create_post_with_lookup(&db, new_post("Hello World"), author, &config, &stale_once)
                .unwrap();
        assert_eq!(post.slug, "hello-world-1");
        assert_eq!(lookups.get(), 3);
    }

    #[test]
    fn test_repeated_insert_conflicts_fail_the_write() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig {
            slug_retry_attempts: 2,
            ..PostsConfig::default()
        };
        posts::create_post(&db, new_post("Hello World"), author, &config).unwrap();

        let always_free = |_: &str, _: Option<i64>| -> anyhow::Result<bool> { Ok(false) };
        let result =
            create_post_with_lookup(&db, new_post("Hello World"), author, &config, &always_free);
        assert!(matches!(result, Err(PostError::WriteFailed(_))));
        assert_eq!(
            posts::count_posts(&db, &PostFilter::default()).unwrap(),
            1
        );
    }

    #[test]
    fn test_explicit_slug_taken_at_insert_is_invalid() {
        let db = create_test_db();
        let author = create_author(&db);
        let config = PostsConfig::default();
        let mut first = new_post("First");
        first.slug = Some("taken".to_string());
        posts::create_post(&db, first, author, &config).unwrap();

        let always_free = |_: &str, _: Option<i64>| -> anyhow::Result<bool> { Ok(false) };
        let mut second = new_post("Second");
        second.slug = Some("taken".to_string());
        match create_post_with_lookup(&db, second, author, &config, &always_free) {
            Err(PostError::Invalid(msg)) => assert!(msg.contains("taken"), "{}", msg),
            other => panic!("expected a validation error, got {:?}", other.map(|p| p.slug)),
        }
    }

    #[test]
    fn test_retry_until_success() {
        let result = with_slug_retry(3, |attempt| {
            if attempt < 3 {
                Err(PostError::SlugConflict {
                    slug: "hello".to_string(),
                })
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_gives_up() {
        let mut calls = 0;
        let result: Result<(), PostError> = with_slug_retry(2, |_| {
            calls += 1;
            Err(PostError::SlugConflict {
                slug: "hello".to_string(),
            })
        });
        assert!(matches!(result, Err(PostError::WriteFailed(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), PostError> = with_slug_retry(5, |_| {
            calls += 1;
            Err(PostError::Invalid("bad".to_string()))
        });
        assert!(matches!(result, Err(PostError::Invalid(_))));
        assert_eq!(calls, 1);
    }
}

mod query_integration_tests {
    use super::*;
    use chrono::NaiveDate;

    fn seed(db: &Database) {
        let author = create_author(db);
        let config = PostsConfig::default();
        let samples = [
            ("Rust Patterns", "rust,Systems", true, "2024-03-10T09:00:00.000Z"),
            ("Django Tips", "Django,python", true, "2024-03-15T23:30:00.000Z"),
            ("Async Python", "Python,async", true, "2024-03-20T08:00:00.000Z"),
            ("Secret Draft", "rust", false, "2024-03-21T08:00:00.000Z"),
        ];
        for (title, tags, published, created_at) in samples {
            let mut input = new_post(title);
            input.tags = TagsInput::Text(tags.to_string());
            input.published = published;
            let post = posts::create_post(db, input, author, &config).unwrap();
            db.get()
                .unwrap()
                .execute(
                    "UPDATE posts SET created_at = ? WHERE id = ?",
                    (created_at, post.id),
                )
                .unwrap();
        }
    }

    fn titles(db: &Database, filter: &PostFilter) -> Vec<String> {
        posts::list_posts(db, filter, 100, 0)
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect()
    }

    #[test]
    fn test_published_filter_and_default_order() {
        let db = create_test_db();
        seed(&db);

        assert_eq!(
            titles(&db, &published_only()),
            vec!["Async Python", "Django Tips", "Rust Patterns"]
        );
        assert_eq!(posts::count_posts(&db, &PostFilter::default()).unwrap(), 4);

        let drafts = PostFilter {
            published: Some(false),
            ..PostFilter::default()
        };
        assert_eq!(titles(&db, &drafts), vec!["Secret Draft"]);
    }

    #[test]
    fn test_search() {
        let db = create_test_db();
        seed(&db);

        let filter = PostFilter {
            search: Some("python".to_string()),
            ..published_only()
        };
        assert_eq!(titles(&db, &filter), vec!["Async Python", "Django Tips"]);

        let filter = PostFilter {
            search: Some("100%".to_string()),
            ..published_only()
        };
        assert!(titles(&db, &filter).is_empty());
    }

    #[test]
    fn test_tag_filter_any_match_case_insensitive() {
        let db = create_test_db();
        seed(&db);

        let filter = PostFilter {
            tags: vec!["PYTHON".to_string()],
            ..published_only()
        };
        assert_eq!(titles(&db, &filter), vec!["Async Python", "Django Tips"]);

        let filter = PostFilter {
            tags: vec!["systems".to_string(), "async".to_string()],
            ..published_only()
        };
        assert_eq!(titles(&db, &filter), vec!["Async Python", "Rust Patterns"]);

        // Whole tags only.
        let filter = PostFilter {
            tags: vec!["pyth".to_string()],
            ..published_only()
        };
        assert!(titles(&db, &filter).is_empty());
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let db = create_test_db();
        seed(&db);

        let filter = PostFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            ..published_only()
        };
        assert_eq!(titles(&db, &filter), vec!["Django Tips"]);

        let filter = PostFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 16),
            ..published_only()
        };
        assert_eq!(titles(&db, &filter), vec!["Async Python"]);
    }

    #[test]
    fn test_ordering_and_paging() {
        let db = create_test_db();
        seed(&db);

        let filter = PostFilter {
            ordering: PostOrdering::TitleAsc,
            ..published_only()
        };
        let page: Vec<String> = posts::list_posts(&db, &filter, 2, 1)
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(page, vec!["Django Tips", "Rust Patterns"]);
        assert_eq!(posts::count_posts(&db, &filter).unwrap(), 3);
    }

    #[test]
    fn test_all_tags_published_only() {
        let db = create_test_db();
        seed(&db);

        let tags = posts::all_tags(&db, &published_only()).unwrap();
        assert_eq!(
            tags,
            vec!["Django", "Python", "Systems", "async", "python", "rust"]
        );
    }

    #[test]
    fn test_all_tags_empty() {
        let db = create_test_db();
        assert!(posts::all_tags(&db, &published_only()).unwrap().is_empty());
    }
}

mod seed_tests {
    use super::*;
    use jotter::cli::seed::seed_posts;

    #[test]
    fn test_seed_is_idempotent() {
        let db = create_test_db();
        create_author(&db);
        let config = Config::default();

        assert_eq!(seed_posts(&db, "editor", &config).unwrap(), 3);
        assert_eq!(seed_posts(&db, "editor", &config).unwrap(), 0);

        let post = posts::get_post_by_slug(&db, "restful-api-best-practices")
            .unwrap()
            .expect("seeded");
        assert_eq!(post.tags, "API,Backend,REST");
    }

    #[test]
    fn test_seed_requires_author() {
        let db = create_test_db();
        assert!(seed_posts(&db, "ghost", &Config::default()).is_err());
    }
}
