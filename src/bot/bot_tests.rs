// ─────────────────────────────── Tests ───────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::api::{
        ApiError, Backend, DashboardSummary, DisasterReport, LoginOk, LoginRequest, MediaUpload,
        ReportSubmission, UserInfo,
    };
    use crate::bot::Bot;
    use crate::bot::flow::{self, ConversationState, FlowKind, StepKind, StepProgress};
    use crate::gateway::{GeoPoint, InboundMessage};
    use crate::store::{MemoryStateStore, MemoryTokenStore, StateStore, TokenStore};
    use std::sync::{Arc, Mutex};

    // ── Test doubles ──

    struct MockBackend {
        accept_login: bool,
        user_name: Option<&'static str>,
        nearby_reports: Vec<DisasterReport>,
        profile_unauthorized: bool,
        submissions: Arc<Mutex<Vec<(ReportSubmission, bool)>>>,
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self {
                accept_login: true,
                user_name: Some("Asha"),
                nearby_reports: Vec::new(),
                profile_unauthorized: false,
                submissions: Arc::default(),
            }
        }
    }

    impl Backend for MockBackend {
        async fn login(&self, _req: &LoginRequest) -> Result<LoginOk, ApiError> {
            if !self.accept_login {
                return Err(ApiError::Backend("invalid credentials".to_string()));
            }
            Ok(LoginOk {
                access_token: "tok-123".to_string(),
                user: Some(UserInfo {
                    name: self.user_name.map(str::to_string),
                    ..UserInfo::default()
                }),
            })
        }

        async fn submit_report(
            &self,
            _token: &str,
            report: &ReportSubmission,
            image: Option<&MediaUpload>,
        ) -> Result<String, ApiError> {
            self.submissions
                .lock()
                .unwrap()
                .push((report.clone(), image.is_some()));
            Ok("Report received.".to_string())
        }

        async fn fetch_media(&self, _url: &str) -> Result<MediaUpload, ApiError> {
            Ok(MediaUpload {
                bytes: vec![0xff, 0xd8, 0xff],
                mime: "image/jpeg".to_string(),
                filename: "photo.jpg".to_string(),
            })
        }

        async fn nearby(&self, _point: GeoPoint) -> Result<Vec<DisasterReport>, ApiError> {
            Ok(self.nearby_reports.clone())
        }

        async fn profile(&self, _token: &str) -> Result<UserInfo, ApiError> {
            if self.profile_unauthorized {
                return Err(ApiError::Unauthorized);
            }
            Ok(UserInfo {
                name: Some("Asha".to_string()),
                email: Some("asha@example.org".to_string()),
                ..UserInfo::default()
            })
        }

        async fn dashboard(&self, _token: &str) -> Result<DashboardSummary, ApiError> {
            Ok(DashboardSummary {
                total_reports: Some(4),
                active_reports: Some(1),
                ..DashboardSummary::default()
            })
        }
    }

    fn fixture(
        backend: MockBackend,
    ) -> (Bot<MockBackend>, Arc<MemoryTokenStore>, Arc<MemoryStateStore>) {
        let tokens = Arc::new(MemoryTokenStore::new());
        let states = Arc::new(MemoryStateStore::new());
        let bot = Bot::new(backend, tokens.clone(), states.clone());
        (bot, tokens, states)
    }

    const USER: &str = "911234567890@c.us";

    fn msg(text: &str) -> InboundMessage {
        InboundMessage {
            id: 1,
            from: USER.to_string(),
            text: text.to_string(),
            location: None,
            media_url: None,
            media_mime: None,
        }
    }

    fn location_msg(latitude: f64, longitude: f64) -> InboundMessage {
        InboundMessage {
            location: Some(GeoPoint {
                latitude,
                longitude,
            }),
            ..msg("")
        }
    }

    fn photo_msg(url: &str) -> InboundMessage {
        InboundMessage {
            media_url: Some(url.to_string()),
            media_mime: Some("image/jpeg".to_string()),
            ..msg("")
        }
    }

    async fn send_all(bot: &Bot<MockBackend>, texts: &[&str]) -> Vec<String> {
        let mut last = Vec::new();
        for text in texts {
            last = bot.handle_message(&msg(text)).await;
        }
        last
    }

    fn disaster(kind: &str, status: &str) -> DisasterReport {
        DisasterReport {
            id: Some(format!("{kind}-1")),
            emergency_type: Some(kind.to_string()),
            urgency_level: Some("high".to_string()),
            status: Some(status.to_string()),
            latitude: Some(12.97),
            longitude: Some(77.59),
            ..DisasterReport::default()
        }
    }

    // ── Validators ──

    #[test]
    fn latitude_out_of_range_is_rejected() {
        assert!(flow::validate(StepKind::Latitude, "90.0001").is_err());
        assert!(flow::validate(StepKind::Latitude, "-91").is_err());
        assert!(flow::validate(StepKind::Latitude, "12.97").is_ok());
        assert!(flow::validate(StepKind::Latitude, "-90").is_ok());
    }

    #[test]
    fn longitude_out_of_range_is_rejected() {
        assert!(flow::validate(StepKind::Longitude, "180.5").is_err());
        assert!(flow::validate(StepKind::Longitude, "-181").is_err());
        assert!(flow::validate(StepKind::Longitude, "180").is_ok());
    }

    #[test]
    fn non_numeric_and_non_finite_coordinates_are_rejected() {
        assert!(flow::validate(StepKind::Latitude, "near the bridge").is_err());
        assert!(flow::validate(StepKind::Latitude, "NaN").is_err());
        assert!(flow::validate(StepKind::Latitude, "inf").is_err());
        assert!(flow::validate(StepKind::Latitude, "").is_err());
    }

    #[test]
    fn urgency_must_be_a_known_level() {
        let levels: &[&str] = &["low", "medium", "high", "critical"];
        assert!(flow::validate(StepKind::Choice(levels), "urgent!!").is_err());
        assert!(flow::validate(StepKind::Choice(levels), "HIGH").is_ok());
        assert!(flow::validate(StepKind::Choice(levels), "critical").is_ok());
    }

    // ── Dispatcher basics ──

    #[tokio::test]
    async fn unrecognized_text_gets_a_generic_reply() {
        let (bot, _, states) = fixture(MockBackend::default());
        let replies = bot.handle_message(&msg("hello there")).await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("Unrecognized command"));
        assert!(states.get(USER).is_none());
    }

    #[tokio::test]
    async fn help_lists_the_command_vocabulary() {
        let (bot, _, _) = fixture(MockBackend::default());
        let replies = bot.handle_message(&msg("!help")).await;
        for command in ["!login", "!reportemergency", "!nearbydisasters", "!cancel"] {
            assert!(replies[0].contains(command), "help is missing {command}");
        }
    }

    #[tokio::test]
    async fn commands_are_case_insensitive_and_trimmed() {
        let (bot, _, states) = fixture(MockBackend::default());
        bot.handle_message(&msg("  !LOGIN  ")).await;
        assert_eq!(states.get(USER).unwrap().flow, FlowKind::Login);
    }

    #[tokio::test]
    async fn report_requires_login_and_creates_no_state() {
        let (bot, _, states) = fixture(MockBackend::default());
        let replies = bot.handle_message(&msg("!reportemergency")).await;
        assert!(replies[0].contains("log in"));
        assert!(states.get(USER).is_none());

        // A subsequent !login starts cleanly.
        let replies = bot.handle_message(&msg("!login")).await;
        assert!(replies[0].contains("username or email"));
        assert_eq!(states.get(USER).unwrap().flow, FlowKind::Login);
    }

    #[tokio::test]
    async fn cancel_without_an_open_flow() {
        let (bot, _, _) = fixture(MockBackend::default());
        let replies = bot.handle_message(&msg("!cancel")).await;
        assert!(replies[0].contains("Nothing to cancel"));
    }

    // ── Login flow ──

    #[tokio::test]
    async fn login_happy_path_with_manual_coordinates() {
        let (bot, tokens, states) = fixture(MockBackend::default());
        let replies = send_all(
            &bot,
            &["!login", "asha@example.org", "hunter2", "12.97", "77.59"],
        )
        .await;

        assert_eq!(tokens.get(USER).as_deref(), Some("tok-123"));
        assert!(states.get(USER).is_none(), "state must be cleared");
        assert!(replies[0].contains("Welcome, Asha"));
    }

    #[tokio::test]
    async fn login_location_attachment_short_circuits_to_terminal() {
        let (bot, tokens, states) = fixture(MockBackend::default());
        send_all(&bot, &["!login", "asha@example.org", "hunter2"]).await;
        let replies = bot.handle_message(&location_msg(12.97, 77.59)).await;

        assert_eq!(tokens.get(USER).as_deref(), Some("tok-123"));
        assert!(states.get(USER).is_none());
        assert!(replies[0].contains("logged in"));
    }

    #[tokio::test]
    async fn login_while_authenticated_is_a_noop() {
        let (bot, tokens, states) = fixture(MockBackend::default());
        tokens.put(USER, "tok-existing").unwrap();
        let replies = bot.handle_message(&msg("!login")).await;
        assert!(replies[0].contains("already logged in"));
        assert!(states.get(USER).is_none());
        assert_eq!(tokens.get(USER).as_deref(), Some("tok-existing"));
    }

    #[tokio::test]
    async fn login_failure_is_generic_and_clears_state() {
        let (bot, tokens, states) = fixture(MockBackend {
            accept_login: false,
            ..MockBackend::default()
        });
        let replies = send_all(&bot, &["!login", "asha@example.org", "wrong", "0", "0"]).await;

        assert!(replies[0].contains("Login failed"));
        // No hint about which credential was wrong.
        assert!(!replies[0].contains("password"));
        assert!(tokens.get(USER).is_none());
        assert!(states.get(USER).is_none());
    }

    #[tokio::test]
    async fn login_greets_without_a_name() {
        let (bot, _, _) = fixture(MockBackend {
            user_name: None,
            ..MockBackend::default()
        });
        let replies = send_all(&bot, &["!login", "asha@example.org", "hunter2", "0", "0"]).await;
        assert_eq!(replies[0], "You're logged in.");
    }

    // ── Step validation / state integrity ──

    #[tokio::test]
    async fn invalid_reply_does_not_advance_the_step() {
        let (bot, _, states) = fixture(MockBackend::default());
        send_all(&bot, &["!login", "asha@example.org", "hunter2"]).await;

        // Two bad latitudes in a row: same hint, state untouched.
        for _ in 0..2 {
            let replies = bot.handle_message(&msg("ninety")).await;
            assert!(replies[0].contains("valid latitude"));
            let state = states.get(USER).unwrap();
            assert_eq!(state.step, 2);
            assert!(state.number("latitude").is_none());
        }

        // A valid reply still lands on the same step afterwards.
        let replies = bot.handle_message(&msg("12.97")).await;
        assert!(replies[0].contains("longitude"));
        assert_eq!(states.get(USER).unwrap().step, 3);
    }

    #[tokio::test]
    async fn cancel_clears_state_at_any_step() {
        let (bot, tokens, states) = fixture(MockBackend::default());
        tokens.put(USER, "tok-123").unwrap();
        send_all(&bot, &["!reportemergency", "flood"]).await;
        assert!(states.get(USER).is_some());

        let replies = bot.handle_message(&msg("!CANCEL")).await;
        assert!(replies[0].contains("Cancelled"));
        assert!(states.get(USER).is_none());

        // The next message is a fresh top-level command again.
        let replies = bot.handle_message(&msg("!help")).await;
        assert!(replies[0].contains("!reportemergency"));
    }

    #[test]
    fn attachment_and_manual_paths_yield_identical_data() {
        let mut by_attachment = ConversationState::new(FlowKind::Login);
        let mut by_hand = ConversationState::new(FlowKind::Login);

        for state in [&mut by_attachment, &mut by_hand] {
            assert!(matches!(
                flow::apply_reply(state, &msg("asha@example.org")),
                StepProgress::Next(_)
            ));
            assert!(matches!(
                flow::apply_reply(state, &msg("hunter2")),
                StepProgress::Next(_)
            ));
        }

        assert_eq!(
            flow::apply_reply(&mut by_attachment, &location_msg(12.97, 77.59)),
            StepProgress::Complete
        );
        assert!(matches!(
            flow::apply_reply(&mut by_hand, &msg("12.97")),
            StepProgress::Next(_)
        ));
        assert_eq!(
            flow::apply_reply(&mut by_hand, &msg("77.59")),
            StepProgress::Complete
        );

        assert_eq!(by_attachment.data, by_hand.data);
    }

    // ── Emergency-report flow ──

    #[tokio::test]
    async fn report_flow_with_skip_submits_exactly_one_json_report() {
        let backend = MockBackend::default();
        let submissions = backend.submissions.clone();
        let (bot, _, states) = fixture(backend);
        send_all(&bot, &["!login", "asha@example.org", "hunter2", "0", "0"]).await;

        let replies = send_all(
            &bot,
            &[
                "!reportemergency",
                "flood",
                "high",
                "Water entering houses near the river bank",
                "50-100",
                "12.97",
                "77.59",
                "skip",
            ],
        )
        .await;

        assert_eq!(replies.len(), 2);
        assert!(replies[0].contains("Submitting"));
        assert_eq!(replies[1], "Report received.");

        let submissions = submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        let (report, had_image) = &submissions[0];
        assert!(!had_image);
        assert_eq!(report.emergency_type, "flood");
        assert_eq!(report.urgency_level, "high");
        assert_eq!(report.people_count, "50-100");
        assert_eq!(report.latitude, 12.97);
        assert_eq!(report.longitude, 77.59);

        assert!(states.get(USER).is_none(), "state must be cleared");
    }

    #[tokio::test]
    async fn report_flow_with_photo_submits_multipart() {
        let backend = MockBackend::default();
        let submissions = backend.submissions.clone();
        let (bot, _, _) = fixture(backend);
        send_all(&bot, &["!login", "asha@example.org", "hunter2", "0", "0"]).await;
        send_all(
            &bot,
            &["!reportemergency", "fire", "critical", "Warehouse on fire", "10"],
        )
        .await;

        // Location attachment jumps straight to the photo step.
        let replies = bot.handle_message(&location_msg(12.97, 77.59)).await;
        assert!(replies[0].contains("photo"));

        let replies = bot
            .handle_message(&photo_msg("http://gateway/media/42"))
            .await;
        assert_eq!(replies[1], "Report received.");

        let submissions = submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert!(submissions[0].1, "submission should carry the image");
    }

    #[tokio::test]
    async fn report_urgency_rejects_unknown_level() {
        let (bot, tokens, states) = fixture(MockBackend::default());
        tokens.put(USER, "tok-123").unwrap();
        let replies = send_all(&bot, &["!reportemergency", "flood", "super bad"]).await;
        assert!(replies[0].contains("low, medium, high, critical"));
        assert_eq!(states.get(USER).unwrap().step, 1);
    }

    // ── Nearby-disasters flow ──

    #[tokio::test]
    async fn nearby_lists_only_active_reports_numbered() {
        let (bot, _, _) = fixture(MockBackend {
            nearby_reports: vec![
                disaster("flood", "active"),
                disaster("landslide", "archived"),
                disaster("fire", "active"),
            ],
            ..MockBackend::default()
        });

        bot.handle_message(&msg("!nearbydisasters")).await;
        let replies = bot.handle_message(&location_msg(12.97, 77.59)).await;

        let reply = &replies[0];
        assert!(reply.contains("1. flood"));
        assert!(reply.contains("2. fire"));
        assert!(!reply.contains("3."));
        assert!(!reply.contains("landslide"));
        assert!(reply.contains("maps.google.com"));
    }

    #[tokio::test]
    async fn nearby_reports_nothing_active() {
        let (bot, _, _) = fixture(MockBackend {
            nearby_reports: vec![disaster("flood", "archived")],
            ..MockBackend::default()
        });
        bot.handle_message(&msg("!nearbydisasters")).await;
        let replies = send_all(&bot, &["12.97", "77.59"]).await;
        assert!(replies[0].contains("No active disasters"));
    }

    #[tokio::test]
    async fn nearby_needs_no_authentication() {
        let (bot, _, states) = fixture(MockBackend::default());
        let replies = bot.handle_message(&msg("!nearbydisasters")).await;
        assert!(replies[0].contains("latitude"));
        assert!(states.get(USER).is_some());
    }

    // ── Sessions ──

    #[tokio::test]
    async fn expired_session_is_evicted_on_profile() {
        let (bot, tokens, _) = fixture(MockBackend {
            profile_unauthorized: true,
            ..MockBackend::default()
        });
        tokens.put(USER, "tok-stale").unwrap();

        let replies = bot.handle_message(&msg("!profile")).await;
        assert!(replies[0].contains("session has expired"));
        assert!(tokens.get(USER).is_none(), "stale token must be evicted");
    }

    #[tokio::test]
    async fn profile_and_dashboard_require_login() {
        let (bot, _, _) = fixture(MockBackend::default());
        for command in ["!profile", "!dashboard"] {
            let replies = bot.handle_message(&msg(command)).await;
            assert!(replies[0].contains("log in"), "{command} should ask for login");
        }
    }

    #[tokio::test]
    async fn dashboard_renders_available_counters() {
        let (bot, tokens, _) = fixture(MockBackend::default());
        tokens.put(USER, "tok-123").unwrap();
        let replies = bot.handle_message(&msg("!dashboard")).await;
        assert!(replies[0].contains("Total reports: 4"));
        assert!(replies[0].contains("Active: 1"));
    }

    #[tokio::test]
    async fn logout_clears_the_session() {
        let (bot, tokens, _) = fixture(MockBackend::default());
        tokens.put(USER, "tok-123").unwrap();

        let replies = bot.handle_message(&msg("!logout")).await;
        assert!(replies[0].contains("logged out"));
        assert!(tokens.get(USER).is_none());

        let replies = bot.handle_message(&msg("!logout")).await;
        assert!(replies[0].contains("not logged in"));
    }
}
