//! Demo dataset loaded into empty stores.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::models::{
    Alert, AlertSeverity, Case, CaseEvent, CaseEventKind, CaseFile, CaseStatus, Finding,
    GroundingSource, Message, MessageRole, User, UserRole, UserStatus, Watchlist,
};

/// Everything a store can be seeded with.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub cases: Vec<Case>,
    pub files: Vec<(String, CaseFile)>,
    pub events: Vec<CaseEvent>,
    pub messages: Vec<(String, Message)>,
    pub users: Vec<User>,
    pub findings: Vec<Finding>,
    pub alerts: Vec<Alert>,
    pub watchlists: Vec<Watchlist>,
    pub knowledge: Vec<String>,
}

fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

fn case(
    id: &str,
    title: &str,
    description: &str,
    status: CaseStatus,
    category: &str,
    tags: &[&str],
    created_by: &str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> Case {
    Case {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        status,
        category: category.to_string(),
        tags: tags.iter().map(ToString::to_string).collect(),
        created_by: created_by.to_string(),
        created_at,
        updated_at,
    }
}

fn file(
    id: &str,
    name: &str,
    mime_type: &str,
    size: u64,
    uploaded_at: DateTime<Utc>,
    by: &str,
) -> CaseFile {
    CaseFile {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: mime_type.to_string(),
        size,
        uploaded_at,
        uploaded_by: by.to_string(),
        analysis: None,
        content_base64: None,
    }
}

fn greeting(id: &str, content: &str, timestamp: DateTime<Utc>) -> Message {
    Message {
        id: id.to_string(),
        role: MessageRole::Assistant,
        content: content.to_string(),
        timestamp,
        sources: None,
        is_report: false,
        is_selected: false,
    }
}

impl Dataset {
    /// The demonstration cases, users and research used by local setups.
    pub fn demo() -> Self {
        let now = Utc::now();

        let cases = vec![
            case(
                "1",
                "Opération Corbeau Numérique",
                "Surveillance des activités de désinformation sur les réseaux sociaux visant le processus électoral.",
                CaseStatus::InProgress,
                "Désinformation",
                &["réseaux sociaux", "ingérence"],
                "Analyste Alpha",
                at(2023, 10, 26, 10, 0),
                at(2023, 10, 28, 14, 30),
            ),
            case(
                "2",
                "Menaces sur Infrastructure Critique",
                "Analyse des menaces potentielles contre les systèmes de vote électronique.",
                CaseStatus::Open,
                "Cybersecurité",
                &["infrastructure", "élection"],
                "Analyste Bravo",
                at(2023, 10, 27, 11, 0),
                at(2023, 10, 27, 11, 0),
            ),
            case(
                "3",
                "Financements Etrangers",
                "Enquête sur des flux financiers suspects potentiellement liés au financement de campagnes.",
                CaseStatus::Closed,
                "Finance",
                &["financement", "transparence"],
                "Analyste Charlie",
                at(2023, 9, 15, 9, 0),
                at(2023, 10, 20, 17, 0),
            ),
        ];

        let files = vec![
            (
                "1".to_string(),
                file(
                    "f1-1",
                    "rapport_veille_oct.pdf",
                    "application/pdf",
                    120_450,
                    at(2023, 10, 26, 10, 5),
                    "Analyste Alpha",
                ),
            ),
            (
                "1".to_string(),
                file(
                    "f1-2",
                    "screenshot_propagande.png",
                    "image/png",
                    850_320,
                    at(2023, 10, 27, 15, 20),
                    "Analyste Alpha",
                ),
            ),
            (
                "2".to_string(),
                file(
                    "f2-1",
                    "analyse_vulnérabilités.docx",
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                    450_100,
                    at(2023, 10, 28, 9, 15),
                    "Analyste Bravo",
                ),
            ),
        ];

        let events = vec![
            CaseEvent {
                id: "e1-1".to_string(),
                case_id: "1".to_string(),
                kind: CaseEventKind::StatusChange {
                    old: CaseStatus::Open,
                    new: CaseStatus::InProgress,
                },
                created_by: "Analyste Alpha".to_string(),
                created_at: at(2023, 10, 26, 10, 0),
            },
            CaseEvent {
                id: "e1-2".to_string(),
                case_id: "1".to_string(),
                kind: CaseEventKind::FileAdded {
                    file_name: "rapport_veille_oct.pdf".to_string(),
                },
                created_by: "Analyste Alpha".to_string(),
                created_at: at(2023, 10, 26, 10, 5),
            },
            CaseEvent {
                id: "e1-3".to_string(),
                case_id: "1".to_string(),
                kind: CaseEventKind::Message {
                    author: "Analyste Alpha".to_string(),
                    text: "Début de l'analyse des sources.".to_string(),
                },
                created_by: "Analyste Alpha".to_string(),
                created_at: at(2023, 10, 26, 10, 10),
            },
        ];

        let messages = vec![
            (
                "1".to_string(),
                greeting(
                    "m1-1",
                    "Bonjour, ceci est la conversation pour le dossier 'Opération Corbeau Numérique'. Comment puis-je vous aider ?",
                    now,
                ),
            ),
            (
                "2".to_string(),
                greeting(
                    "m2-1",
                    "Début de la conversation pour 'Menaces sur Infrastructure Critique'.",
                    now,
                ),
            ),
        ];

        let users = vec![
            User {
                id: "usr-1".to_string(),
                email: "admin@cacrs.gouv.fr".to_string(),
                role: UserRole::Admin,
                status: UserStatus::Active,
            },
            User {
                id: "usr-2".to_string(),
                email: "analyste@cacrs.gouv.fr".to_string(),
                role: UserRole::Analyst,
                status: UserStatus::Active,
            },
            User {
                id: "usr-3".to_string(),
                email: "viewer@cacrs.gouv.fr".to_string(),
                role: UserRole::Viewer,
                status: UserStatus::Blocked,
            },
        ];

        let findings = vec![
            Finding {
                id: "fin-2".to_string(),
                query: "Financement de partis politiques étrangers".to_string(),
                text: "Le Trésor a sanctionné trois entités pour avoir tenté de transférer des fonds illicites vers des campagnes politiques européennes."
                    .to_string(),
                sources: vec![GroundingSource {
                    uri: "https://home.treasury.gov/news/press-releases/jy1234".to_string(),
                    title: "Treasury Sanctions Entities".to_string(),
                }],
                saved_at: at(2023, 11, 2, 14, 30),
            },
            Finding {
                id: "fin-1".to_string(),
                query: "Ingérence électorale et bots sociaux".to_string(),
                text: "Un rapport récent de Graphika a identifié une campagne de 300 comptes sur la plateforme X propageant des narratifs anti-démocratiques..."
                    .to_string(),
                sources: vec![GroundingSource {
                    uri: "https://graphika.com/reports/report-xyz".to_string(),
                    title: "Graphika Report on X".to_string(),
                }],
                saved_at: at(2023, 11, 1, 10, 0),
            },
        ];

        let alerts = vec![
            Alert {
                id: "alert-1".to_string(),
                title: "Nouvelle Connexion Suspecte".to_string(),
                description: "Une connexion depuis une adresse IP non reconnue (18.156.89.1) a été détectée sur le compte de l'Analyste Bravo."
                    .to_string(),
                severity: AlertSeverity::High,
                timestamp: now - Duration::minutes(5),
            },
            Alert {
                id: "alert-2".to_string(),
                title: "Tentative de Brute-force".to_string(),
                description: "Plusieurs tentatives de connexion échouées sur le dossier \"Financements Etrangers\" ont été bloquées."
                    .to_string(),
                severity: AlertSeverity::Medium,
                timestamp: now - Duration::hours(2),
            },
            Alert {
                id: "alert-3".to_string(),
                title: "Mise à jour du système requise".to_string(),
                description: "Une nouvelle version du protocole de chiffrement est disponible. Veuillez planifier la mise à jour."
                    .to_string(),
                severity: AlertSeverity::Low,
                timestamp: now - Duration::days(1),
            },
        ];

        let watchlists = vec![
            Watchlist {
                id: "wl-1".to_string(),
                name: "Surveillance 'Corbeau Numérique'".to_string(),
                query: "Opération Corbeau Numérique activités récentes".to_string(),
                refresh_interval_minutes: 10,
                last_run: now - Duration::minutes(3),
            },
            Watchlist {
                id: "wl-2".to_string(),
                name: "Veille 'Infrastructure Critique'".to_string(),
                query: "Menaces systèmes de vote électronique 2026".to_string(),
                refresh_interval_minutes: 30,
                last_run: now - Duration::minutes(25),
            },
        ];

        let knowledge = vec![
            "Rapport interne 2022: Les campagnes de désinformation russes ciblent souvent les périodes électorales en utilisant des fermes de trolls pour amplifier les récits polarisants."
                .to_string(),
            "Directive 03-B: Toute preuve d'ingérence étrangère doit être signalée au niveau supérieur dans les 24 heures."
                .to_string(),
            "Analyse post-élection 2022: Le groupe 'Cyber Aigle' a été associé à des tentatives de phishing contre des responsables de campagne."
                .to_string(),
        ];

        Self {
            cases,
            files,
            events,
            messages,
            users,
            findings,
            alerts,
            watchlists,
            knowledge,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
            && self.users.is_empty()
            && self.findings.is_empty()
            && self.watchlists.is_empty()
            && self.alerts.is_empty()
            && self.knowledge.is_empty()
    }
}
