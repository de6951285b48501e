use axum::Router;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::SqliteRepository;
use crate::web::{csrf, routes, session};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<SqliteRepository>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<SqliteRepository>, catalog: Arc<Catalog>) -> Self {
        Self {
            config: Arc::new(config),
            db,
            catalog,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new();
    for (name, path) in routes::ROUTES {
        if let Some(handler) = routes::handler(name) {
            debug!("route {} -> {}", path, name);
            router = router.route(path, handler);
        }
    }

    if let Some(ref staticdir) = state.config.staticdir {
        router = router.nest_service("/static", ServeDir::new(staticdir));
    }

    if state.config.debug {
        let prefix = state.config.media_prefix();
        if prefix != "/" {
            info!("Serving media from {} at {}", state.config.media.root, prefix);
            router = router.nest_service(&prefix, ServeDir::new(&state.config.media.root));
        }
    }

    router
        .fallback(crate::middleware::fallback)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            csrf::csrf_protect,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session::load_session,
        ))
        .layer(axum::middleware::from_fn(crate::middleware::log_request))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use chrono::Utc;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::db::{
        Genre, Movie, MovieRepo, PreferenceRepo, RecommendationRepo, Session, SessionRepo, User, UserRepo,
    };
    use crate::web::session::hash_token;

    const CSRF: &str = "testcsrftoken";
    const SESSION: &str = "testsessiontoken";

    fn movie(id: i64, title: &str, genres: Vec<Genre>, runtime: i32, rating: f64) -> Movie {
        Movie {
            id,
            title: title.to_string(),
            year: Some(2000),
            poster: Some(format!("/{}.jpg", id)),
            overview: Some(format!("About {}", title)),
            runtime: Some(runtime),
            rating: Some(rating),
            popularity: Some(1.0),
            genres,
        }
    }

    async fn test_state(config: Config) -> AppState {
        let db = Arc::new(SqliteRepository::new("sqlite::memory:").await.unwrap());
        db.migrate().await.unwrap();
        for m in [
            movie(603, "The Matrix", vec![Genre::Action, Genre::ScienceFiction], 136, 8.2),
            movie(604, "The Matrix Reloaded", vec![Genre::Action, Genre::ScienceFiction], 138, 7.0),
            movie(13, "Forrest Gump", vec![Genre::Comedy, Genre::Drama], 142, 8.5),
            movie(862, "Toy Story", vec![Genre::Animation, Genre::Comedy], 81, 8.0),
        ] {
            db.upsert_movie(&m).await.unwrap();
        }
        db.create_user(&User {
            id: "user-1".to_string(),
            username: "dave".to_string(),
            password: String::new(),
            created: None,
            lastlogin: None,
        })
        .await
        .unwrap();
        db.create_session(&Session {
            token_hash: hash_token(SESSION),
            user_id: "user-1".to_string(),
            created: Some(Utc::now()),
            lastused: Some(Utc::now()),
        })
        .await
        .unwrap();

        let catalog = Arc::new(Catalog::new(db.clone()).unwrap());
        catalog.reindex().await.unwrap();
        AppState::new(config, db, catalog)
    }

    async fn send(state: &AppState, req: Request<Body>) -> Response {
        build_router(state.clone()).oneshot(req).await.unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str, logged_in: bool) -> Request<Body> {
        let cookie = if logged_in {
            format!("csrftoken={}; sessionid={}", CSRF, SESSION)
        } else {
            format!("csrftoken={}", CSRF)
        };
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, cookie)
            .header("X-CSRFToken", CSRF)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_pages_render() {
        let state = test_state(Config::default()).await;
        for uri in ["/", "/about/", "/contact/", "/search/movies?q=matrix", "/movie/?id=603", "/accounts/login/"] {
            let resp = send(&state, get(uri)).await;
            assert_eq!(resp.status(), StatusCode::OK, "GET {}", uri);
        }

        let body = text_body(send(&state, get("/movie/?id=603")).await).await;
        assert!(body.contains("The Matrix"));
        assert!(body.contains("Similar movies"));
        assert!(body.contains("/movie/?id=604"));
    }

    #[tokio::test]
    async fn test_about_reports_database_failure() {
        let state = test_state(Config::default()).await;
        state.db.pool().close().await;
        let resp = send(&state, get("/about/")).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unknown_movie_and_path_are_404() {
        let state = test_state(Config::default()).await;
        assert_eq!(send(&state, get("/movie/?id=999")).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&state, get("/movie/?id=abc")).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&state, get("/movie/")).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&state, get("/nowhere/")).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_slash_redirects() {
        let state = test_state(Config::default()).await;
        let resp = send(&state, get("/about")).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.headers()[header::LOCATION], "/about/");

        let resp = send(&state, get("/movie?id=13")).await;
        assert_eq!(resp.headers()[header::LOCATION], "/movie/?id=13");
    }

    #[tokio::test]
    async fn test_csrf_token_endpoint_sets_cookie() {
        let state = test_state(Config::default()).await;
        let resp = send(&state, get("/get-csrf-token/")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("csrftoken="));

        let body = json_body(resp).await;
        let token = body["csrf_token"].as_str().unwrap();
        assert!(cookie.contains(token));
    }

    #[tokio::test]
    async fn test_post_without_csrf_is_forbidden() {
        let state = test_state(Config::default()).await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/search/movies")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"search": "matrix"}"#))
            .unwrap();
        assert_eq!(send(&state, req).await.status(), StatusCode::FORBIDDEN);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/search/movies")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, "csrftoken=one")
            .header("X-CSRFToken", "two")
            .body(Body::from(r#"{"search": "matrix"}"#))
            .unwrap();
        assert_eq!(send(&state, req).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_search_api() {
        let state = test_state(Config::default()).await;
        let resp = send(&state, post_json("/api/search/movies", r#"{"search": "matrix", "send_all": true}"#, false)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let movies = body["movies"].as_array().unwrap();
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0]["name"], "The Matrix");
        assert_eq!(movies[0]["genres"][1], "Science Fiction");

        let body = json_body(send(&state, get("/api/search/movies?search=gump")).await).await;
        assert_eq!(body["movies"][0]["id"], 13);

        let body = json_body(send(&state, get("/api/search/movies?search=")).await).await;
        assert!(body["movies"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_limit_without_send_all() {
        let mut config = Config::default();
        config.search.default_limit = 1;
        let state = test_state(config).await;
        let body = json_body(send(&state, post_json("/api/search/movies", r#"{"search": "matrix"}"#, false)).await).await;
        assert_eq!(body["movies"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_random_movies_clamps_amount() {
        let mut config = Config::default();
        config.random_movies.max_amount = 2;
        let state = test_state(config).await;
        let body = json_body(send(&state, get("/api/movies/?amount=50")).await).await;
        assert_eq!(body["movies"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_profile_requires_login() {
        let state = test_state(Config::default()).await;
        let resp = send(&state, get("/profile/")).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/accounts/login/?next=%2Fprofile%2F");

        let req = Request::builder()
            .uri("/profile/")
            .header(header::COOKIE, format!("sessionid={}", SESSION))
            .body(Body::empty())
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(text_body(resp).await.contains("dave"));
    }

    #[tokio::test]
    async fn test_contact_form() {
        let state = test_state(Config::default()).await;
        let form = format!("csrfmiddlewaretoken={}&name=Ann&email=ann%40example.com&message=Hello", CSRF);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/contact/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, format!("csrftoken={}", CSRF))
            .body(Body::from(form))
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(text_body(resp).await.contains("Thanks Ann"));

        let form = format!("csrfmiddlewaretoken={}&name=&email=x&message=", CSRF);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/contact/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, format!("csrftoken={}", CSRF))
            .body(Body::from(form))
            .unwrap();
        assert_eq!(send(&state, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_onboarding_and_toggle() {
        let state = test_state(Config::default()).await;

        let resp = send(&state, post_json("/accounts/onboarding/movies/", "{}", false)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let prefs = r#"{"movies_liked": ["603"], "movies_disliked": [], "movies_watched": ["603", "13"],
            "watchlist": ["862"], "movies_rewatch": [], "movies_blocked": []}"#;
        let resp = send(&state, post_json("/accounts/onboarding/movies/", prefs, true)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let stored = state.db.get_preferences("user-1").await.unwrap();
        assert!(stored.liked.contains(&603));
        assert!(stored.watchlist.contains(&862));

        let req = Request::builder()
            .uri("/accounts/preferences/movies")
            .header(header::COOKIE, format!("sessionid={}", SESSION))
            .body(Body::empty())
            .unwrap();
        let body = json_body(send(&state, req).await).await;
        assert_eq!(body["movies_watched"], serde_json::json!(["13", "603"]));

        let resp = send(&state, post_json("/accounts/preferences/movies/13", r#"{"action": "watchlist"}"#, true)).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = json_body(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("You cannot add a movie you have seen"));

        let resp = send(&state, post_json("/accounts/preferences/movies/862", r#"{"action": "liked"}"#, true)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["watchlist"], serde_json::json!([]));
        assert_eq!(body["movies_liked"], serde_json::json!(["603", "862"]));

        let resp = send(&state, post_json("/accounts/preferences/movies/999", r#"{"action": "liked"}"#, true)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_onboarding_rejects_inconsistent_and_unknown() {
        let state = test_state(Config::default()).await;
        let resp = send(&state, post_json("/accounts/onboarding/movies/", r#"{"movies_liked": [603]}"#, true)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(&state, post_json("/accounts/onboarding/movies/", r#"{"movies_watched": [1234]}"#, true)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].as_str().unwrap().contains("1234"));
    }

    #[tokio::test]
    async fn test_recommendation_api() {
        let state = test_state(Config::default()).await;
        let resp = send(
            &state,
            post_json("/api/recommendations", r#"{"genres": ["Comedy"], "runtime_max": 120}"#, true),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        let id = body["id"].as_str().unwrap().to_string();
        assert_eq!(body["possible_films"][0]["id"], 862);
        assert_eq!(body["user_id"], "user-1");

        assert_eq!(state.db.get_possible_recommendations(862).await.unwrap(), vec![id.clone()]);

        let body = json_body(send(&state, get(&format!("/api/recommendations/{}", id))).await).await;
        assert_eq!(body["recommended_films"][0]["name"], "Toy Story");
        assert_eq!(body["genres"], serde_json::json!(["Comedy"]));

        let resp = send(&state, get("/api/recommendations/missing")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_signup_login_logout() {
        let state = test_state(Config::default()).await;
        let form = format!(
            "csrfmiddlewaretoken={}&username=erin&password1=correct-horse&password2=correct-horse&next=%2F",
            CSRF
        );
        let req = Request::builder()
            .method(Method::POST)
            .uri("/accounts/signup/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, format!("csrftoken={}", CSRF))
            .body(Body::from(form))
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");
        assert!(state.db.get_user("erin").await.is_ok());

        let form = format!("csrfmiddlewaretoken={}&username=erin&password=wrong", CSRF);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/accounts/login/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, format!("csrftoken={}", CSRF))
            .body(Body::from(form))
            .unwrap();
        assert_eq!(send(&state, req).await.status(), StatusCode::UNAUTHORIZED);

        let form = format!("csrfmiddlewaretoken={}&username=erin&password=correct-horse", CSRF);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/accounts/login/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, format!("csrftoken={}", CSRF))
            .body(Body::from(form))
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/profile/");
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Secure"));
        let token = cookie
            .strip_prefix("sessionid=")
            .and_then(|c| c.split(';').next())
            .unwrap()
            .to_string();

        let form = format!("csrfmiddlewaretoken={}", CSRF);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/accounts/logout/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, format!("csrftoken={}; sessionid={}", CSRF, token))
            .body(Body::from(form))
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let cleared = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cleared.starts_with("sessionid="));
        assert!(cleared.contains("Max-Age=0"));
        assert!(state.db.get_session(&hash_token(&token)).await.is_err());
    }

    #[tokio::test]
    async fn test_cookies_are_secure_over_tls() {
        let mut config = Config::default();
        config.listen.tlscert = Some("cert.pem".to_string());
        config.listen.tlskey = Some("key.pem".to_string());
        let state = test_state(config).await;

        let resp = send(&state, get("/get-csrf-token/")).await;
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("csrftoken="));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_idle_session_is_expired() {
        let state = test_state(Config::default()).await;
        let stale = Utc::now() - chrono::Duration::days(30);
        db_session(&state, "stalesessiontoken", stale).await;

        let req = Request::builder()
            .uri("/profile/")
            .header(header::COOKIE, "sessionid=stalesessiontoken")
            .body(Body::empty())
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(state.db.get_session(&hash_token("stalesessiontoken")).await.is_err());

        let mut config = Config::default();
        config.sessions.max_idle_days = 60;
        let state = test_state(config).await;
        db_session(&state, "stalesessiontoken", stale).await;
        let req = Request::builder()
            .uri("/profile/")
            .header(header::COOKIE, "sessionid=stalesessiontoken")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&state, req).await.status(), StatusCode::OK);
    }

    async fn db_session(state: &AppState, token: &str, lastused: chrono::DateTime<Utc>) {
        state
            .db
            .create_session(&Session {
                token_hash: hash_token(token),
                user_id: "user-1".to_string(),
                created: Some(lastused),
                lastused: Some(lastused),
            })
            .await
            .unwrap();
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, format!("csrftoken={}; sessionid={}", CSRF, SESSION))
            .body(Body::from(format!("csrfmiddlewaretoken={}&{}", CSRF, body)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_onboarding_page_and_form_toggles() {
        let state = test_state(Config::default()).await;

        let resp = send(&state, get("/accounts/onboarding/movies/")).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            resp.headers()[header::LOCATION],
            "/accounts/login/?next=%2Faccounts%2Fonboarding%2Fmovies%2F"
        );

        let req = Request::builder()
            .uri("/accounts/onboarding/movies/")
            .header(header::COOKIE, format!("sessionid={}", SESSION))
            .body(Body::empty())
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = text_body(resp).await;
        // Four movies, six list toggles each.
        assert_eq!(body.matches(r#"name="action""#).count(), 24);
        assert!(body.contains(r#"action="/accounts/preferences/movies/862""#));

        let resp = send(
            &state,
            post_form("/accounts/preferences/movies/862", "action=watchlist&next=%2Fmovie%2F%3Fid%3D862"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/movie/?id=862");
        assert!(state.db.get_preferences("user-1").await.unwrap().watchlist.contains(&862));

        let resp = send(&state, post_form("/accounts/preferences/movies/603", "action=watched")).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/profile/");

        let resp = send(&state, post_form("/accounts/preferences/movies/603", "action=watchlist")).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(text_body(resp).await.contains("You cannot add a movie you have seen"));

        let resp = send(&state, post_form("/accounts/preferences/movies/603", "action=bogus")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .uri("/movie/?id=862")
            .header(header::COOKIE, format!("sessionid={}", SESSION))
            .body(Body::empty())
            .unwrap();
        let body = text_body(send(&state, req).await).await;
        assert_eq!(body.matches(r#"action="/accounts/preferences/movies/862""#).count(), 6);
        assert_eq!(body.matches("toggle active").count(), 1);
    }

    #[tokio::test]
    async fn test_media_served_only_in_debug() {
        let dir = std::env::temp_dir().join(format!("movierec-media-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("poster.txt"), "poster").unwrap();

        let mut config = Config::default();
        config.media.root = dir.to_string_lossy().to_string();
        let state = test_state(config.clone()).await;
        assert_eq!(send(&state, get("/media/poster.txt")).await.status(), StatusCode::NOT_FOUND);

        config.debug = true;
        let state = test_state(config).await;
        let resp = send(&state, get("/media/poster.txt")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(text_body(resp).await, "poster");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
