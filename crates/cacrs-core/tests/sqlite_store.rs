//! SQLite store tests: behaviour parity with the in-memory store and
//! persistence across reopen.

use cacrs_core::CaseRepository;
use cacrs_core::Error;
use cacrs_core::models::{
    CaseEventKind, CaseStatus, FileAnalysis, GroundingSource, MessageRole, NewCase, NewCaseFile,
    NewFinding, NewMessage, NewWatchlist, UserRole, UserStatus,
};
use cacrs_core::store::{Dataset, SqliteStore};
use uuid::Uuid;

fn temp_db_path() -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("cacrs-store-test-{}.db", Uuid::new_v4()));
    path
}

async fn seeded() -> SqliteStore {
    let store = SqliteStore::open(&temp_db_path()).await.expect("open db");
    assert!(
        store
            .import_if_empty(&Dataset::demo())
            .await
            .expect("import")
    );
    store
}

#[tokio::test]
async fn demo_import_runs_once() {
    let path = temp_db_path();
    {
        let store = SqliteStore::open(&path).await.expect("open db");
        assert!(store.import_if_empty(&Dataset::demo()).await.expect("import"));
        store.close().await;
    }
    let store = SqliteStore::open(&path).await.expect("reopen db");
    assert!(!store.import_if_empty(&Dataset::demo()).await.expect("import"));
    assert_eq!(store.list_cases().await.expect("cases").len(), 3);
    store.close().await;
}

#[tokio::test]
async fn cases_are_listed_newest_first() {
    let store = seeded().await;
    let cases = store.list_cases().await.expect("cases");
    let ids: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1", "3"]);

    let created = store
        .create_case(
            NewCase {
                title: "  Réseau de bots  ".to_string(),
                description: String::new(),
                category: "Désinformation".to_string(),
                tags: vec!["bots".to_string(), "bots".to_string(), " ".to_string()],
            },
            "Analyste Alpha",
        )
        .await
        .expect("create");
    assert_eq!(created.title, "Réseau de bots");
    assert_eq!(created.tags, vec!["bots"]);

    let cases = store.list_cases().await.expect("cases");
    assert_eq!(cases[0].id, created.id);
    assert_eq!(cases[0].tags, vec!["bots"]);
}

#[tokio::test]
async fn status_change_is_recorded_on_timeline() {
    let store = seeded().await;
    let case = store
        .set_case_status("2", CaseStatus::InProgress, "Analyste Bravo")
        .await
        .expect("status");
    assert_eq!(case.status, CaseStatus::InProgress);

    // Setting the same status again records nothing.
    store
        .set_case_status("2", CaseStatus::InProgress, "Analyste Bravo")
        .await
        .expect("status");

    let events = store.list_events("2").await.expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].kind,
        CaseEventKind::StatusChange {
            old: CaseStatus::Open,
            new: CaseStatus::InProgress,
        }
    );

    let err = store
        .set_case_status("404", CaseStatus::Closed, "x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn files_and_analysis_round_trip() {
    let store = seeded().await;
    let file = store
        .add_file(
            "1",
            NewCaseFile {
                name: "affiche.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
                size: 2048,
                content_base64: Some("aGVsbG8=".to_string()),
            },
            "Analyste Alpha",
        )
        .await
        .expect("add file");

    let analysis = FileAnalysis {
        summary: "Affiche électorale".to_string(),
        entities: vec!["Parti X".to_string()],
        risks: vec![],
    };
    let updated = store
        .set_file_analysis("1", &file.id, analysis.clone())
        .await
        .expect("analysis");
    assert_eq!(updated.analysis.as_ref(), Some(&analysis));

    let files = store.list_files("1").await.expect("files");
    assert_eq!(files.len(), 3);
    assert_eq!(files[2].id, file.id);
    assert_eq!(files[2].size, 2048);
    assert_eq!(files[2].content_base64.as_deref(), Some("aGVsbG8="));

    let kinds: Vec<CaseEventKind> = store
        .list_events("1")
        .await
        .expect("events")
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&CaseEventKind::FileAdded {
        file_name: "affiche.jpg".to_string()
    }));
    assert!(kinds.contains(&CaseEventKind::AiAnalysis {
        file_name: "affiche.jpg".to_string(),
        summary: "Affiche électorale".to_string(),
    }));
}

#[tokio::test]
async fn messages_keep_append_order_and_selection() {
    let store = seeded().await;
    let user = store
        .append_message("2", NewMessage::user("Quelles failles ?"))
        .await
        .expect("append");
    let reply = store
        .append_message("2", NewMessage::assistant(""))
        .await
        .expect("append");
    store
        .update_message_content("2", &reply.id, "Trois failles.")
        .await
        .expect("update");
    store
        .set_message_selected("2", &user.id, true)
        .await
        .expect("select");

    let log = store.list_messages("2").await.expect("messages");
    let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "Début de la conversation pour 'Menaces sur Infrastructure Critique'.",
            "Quelles failles ?",
            "Trois failles."
        ]
    );
    assert_eq!(log[1].role, MessageRole::User);
    assert!(log[1].is_selected);

    store.clear_selection("2").await.expect("clear");
    let log = store.list_messages("2").await.expect("messages");
    assert!(log.iter().all(|m| !m.is_selected));

    let report = store
        .append_message("2", NewMessage::report("## Rapport"))
        .await
        .expect("report");
    assert!(matches!(
        store.set_message_selected("2", &report.id, true).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn delete_case_cascades() {
    let store = seeded().await;
    store.delete_case("1").await.expect("delete");
    assert!(store.get_case("1").await.expect("get").is_none());
    assert!(store.list_files("1").await.expect("files").is_empty());
    assert!(store.list_messages("1").await.expect("messages").is_empty());
    assert!(store.list_events("1").await.expect("events").is_empty());
    assert!(matches!(
        store.delete_case("1").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn findings_and_watchlists() {
    let store = seeded().await;
    let finding = store
        .add_finding(NewFinding {
            query: "bots électoraux".to_string(),
            text: "Résultat".to_string(),
            sources: vec![GroundingSource {
                uri: "https://example.org".to_string(),
                title: "Exemple".to_string(),
            }],
        })
        .await
        .expect("finding");

    let findings = store.list_findings().await.expect("findings");
    assert_eq!(findings[0].id, finding.id);
    assert_eq!(findings[0].sources, finding.sources);
    assert_eq!(findings.len(), 3);

    let removed = store
        .delete_findings(&[finding.id.clone(), "fin-1".to_string(), "missing".to_string()])
        .await
        .expect("delete");
    assert_eq!(removed, 2);
    assert_eq!(store.list_findings().await.expect("findings").len(), 1);

    let watchlist = store
        .add_watchlist(NewWatchlist {
            name: "Veille bots".to_string(),
            query: "bots".to_string(),
            refresh_interval_minutes: 15,
        })
        .await
        .expect("watchlist");
    let watchlists = store.list_watchlists().await.expect("watchlists");
    assert_eq!(watchlists[0].id, watchlist.id);
    assert_eq!(watchlists[0].refresh_interval_minutes, 15);
}

#[tokio::test]
async fn users_roles_and_status() {
    let store = seeded().await;
    let admin = store
        .find_user_by_email("ADMIN@cacrs.gouv.fr")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(admin.role, UserRole::Admin);

    let user = store
        .set_user_role("usr-2", UserRole::Contributor)
        .await
        .expect("role");
    assert_eq!(user.role, UserRole::Contributor);
    let user = store
        .set_user_status("usr-2", UserStatus::Blocked)
        .await
        .expect("status");
    assert_eq!(user.status, UserStatus::Blocked);

    assert!(matches!(
        store.set_user_role("nobody", UserRole::Viewer).await,
        Err(Error::NotFound(_))
    ));
    assert_eq!(store.list_users().await.expect("users").len(), 3);
}

#[tokio::test]
async fn context_and_alerts() {
    let store = seeded().await;
    let context = store.retrieve_context("ingérence").await.expect("context");
    assert_eq!(context.split("\n\n").count(), 3);
    assert!(context.contains("Directive 03-B"));

    let alerts = store.list_alerts().await.expect("alerts");
    assert_eq!(alerts[0].id, "alert-1");
}

#[tokio::test]
async fn data_survives_reopen() {
    let path = temp_db_path();
    let case_id = {
        let store = SqliteStore::open(&path).await.expect("open db");
        let case = store
            .create_case(
                NewCase {
                    title: "Persistant".to_string(),
                    description: "d".to_string(),
                    category: "c".to_string(),
                    tags: vec!["t".to_string()],
                },
                "Analyste",
            )
            .await
            .expect("create");
        store
            .append_message(&case.id, NewMessage::user("Bonjour"))
            .await
            .expect("append");
        store.close().await;
        case.id
    };

    let store = SqliteStore::open(&path).await.expect("reopen db");
    let case = store.get_case(&case_id).await.expect("get").expect("exists");
    assert_eq!(case.title, "Persistant");
    let log = store.list_messages(&case_id).await.expect("messages");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].content, "Bonjour");
    store.close().await;
}
