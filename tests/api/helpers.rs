use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer,
    cookie::Cookie,
    http::header::{ContentType, LOCATION},
    web,
};
use secrecy::SecretString;
use std::collections::{HashMap, HashSet};
use std::net::TcpListener;
use std::sync::{LazyLock, Mutex};
use uuid::Uuid;

use csrf_autograder::{
    configuration::{Settings, get_configuration},
    credentials::Credentials,
    fixture::Fixture,
    harness::Harness,
    telemetry::{get_subscriber, init_subscriber},
};

// ensure the `tracing` subscriber is only initialized once using `LazyLock`
static TRACING: LazyLock<()> = LazyLock::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

/// How the stand-in application hands out and checks csrf tokens.
#[derive(Clone, Copy)]
pub struct StandInConfig {
    // set the `csrftoken` cookie (otherwise tokens live server-side only)
    pub csrf_cookie: bool,
    // render the hidden `csrfmiddlewaretoken` input in pages
    pub token_in_body: bool,
    // reject anonymous posts with 401
    pub require_login: bool,
}

impl Default for StandInConfig {
    fn default() -> Self {
        Self {
            csrf_cookie: true,
            token_in_body: true,
            require_login: true,
        }
    }
}

struct Account {
    password: String,
    is_admin: bool,
}

/// A small in-memory copy of the django app the autograder targets.
pub struct StandIn {
    config: StandInConfig,
    accounts: Mutex<HashMap<String, Account>>,
    sessions: Mutex<HashMap<String, String>>,
    // tokens issued when no cookie carries them
    issued: Mutex<HashSet<String>>,
    pub posts: Mutex<Vec<(String, String)>>,
}

impl StandIn {
    fn new(config: StandInConfig) -> Self {
        Self {
            config,
            accounts: Mutex::default(),
            sessions: Mutex::default(),
            issued: Mutex::default(),
            posts: Mutex::default(),
        }
    }

    fn current_user(&self, req: &HttpRequest) -> Option<String> {
        let session_id = req.cookie("sessionid")?;
        self.sessions
            .lock()
            .unwrap()
            .get(session_id.value())
            .cloned()
    }

    fn issue_token(&self, req: &HttpRequest) -> String {
        if self.config.csrf_cookie {
            if let Some(cookie) = req.cookie("csrftoken") {
                return cookie.value().to_string();
            }
        }
        let token = Uuid::new_v4().simple().to_string();
        self.issued.lock().unwrap().insert(token.clone());
        token
    }

    fn csrf_ok(&self, req: &HttpRequest, form_token: &str) -> bool {
        let header = req
            .headers()
            .get("X-CSRFToken")
            .and_then(|v| v.to_str().ok());
        if header != Some(form_token) {
            return false;
        }
        if self.config.csrf_cookie {
            req.cookie("csrftoken")
                .is_some_and(|cookie| cookie.value() == form_token)
        } else {
            self.issued.lock().unwrap().contains(form_token)
        }
    }

    fn page(&self, req: &HttpRequest, title: &str) -> HttpResponse {
        let token = self.issue_token(req);
        let input = if self.config.token_in_body {
            format!(r#"<input type="hidden" name="csrfmiddlewaretoken" value="{token}">"#)
        } else {
            String::new()
        };
        let mut response = HttpResponse::Ok();
        if self.config.csrf_cookie {
            response.cookie(csrf_cookie(token));
        }
        response
            .content_type(ContentType::html())
            .body(format!("<h1>{title}</h1><form method=\"post\">{input}</form>"))
    }
}

fn csrf_cookie(token: String) -> Cookie<'static> {
    Cookie::build("csrftoken", token).path("/").finish()
}

#[derive(serde::Deserialize)]
struct CreateUserForm {
    email: String,
    is_admin: String,
    user_name: String,
    password: String,
}

#[derive(serde::Deserialize)]
struct LoginForm {
    username: String,
    password: String,
    csrfmiddlewaretoken: String,
}

#[derive(serde::Deserialize)]
struct PostForm {
    title: String,
    #[allow(dead_code)]
    content: String,
    csrfmiddlewaretoken: String,
}

async fn login_page(req: HttpRequest, app: web::Data<StandIn>) -> HttpResponse {
    app.page(&req, "Log in")
}

async fn login(
    req: HttpRequest,
    form: web::Form<LoginForm>,
    app: web::Data<StandIn>,
) -> HttpResponse {
    if !app.csrf_ok(&req, &form.csrfmiddlewaretoken) {
        return HttpResponse::Forbidden().body("CSRF verification failed. Request aborted.");
    }

    let valid = app
        .accounts
        .lock()
        .unwrap()
        .get(&form.username)
        .is_some_and(|account| account.password == form.password);
    if !valid {
        return HttpResponse::Ok().content_type(ContentType::html()).body(
            "Please enter a correct username and password. \
            Note that both fields may be case-sensitive.",
        );
    }

    let session_id = Uuid::new_v4().to_string();
    app.sessions
        .lock()
        .unwrap()
        .insert(session_id.clone(), form.username.clone());

    // the token rotates on login
    app.issued.lock().unwrap().remove(&form.csrfmiddlewaretoken);
    let mut response = HttpResponse::Found();
    response
        .insert_header((LOCATION, "/app/new"))
        .cookie(Cookie::build("sessionid", session_id).path("/").finish());
    if app.config.csrf_cookie {
        response.cookie(csrf_cookie(Uuid::new_v4().simple().to_string()));
    }
    response.finish()
}

async fn create_user(form: web::Form<CreateUserForm>, app: web::Data<StandIn>) -> HttpResponse {
    let mut accounts = app.accounts.lock().unwrap();
    if accounts.contains_key(&form.user_name) || !form.email.contains('@') {
        return HttpResponse::BadRequest().body("user already exists");
    }
    accounts.insert(
        form.user_name.clone(),
        Account {
            password: form.password.clone(),
            is_admin: form.is_admin == "1",
        },
    );
    HttpResponse::Ok().body("created")
}

async fn new_post_page(req: HttpRequest, app: web::Data<StandIn>) -> HttpResponse {
    if app.current_user(&req).is_none() {
        return HttpResponse::Found()
            .insert_header((LOCATION, "/accounts/login/?next=/app/new"))
            .finish();
    }
    app.page(&req, "New post")
}

async fn create_post(
    req: HttpRequest,
    form: web::Form<PostForm>,
    app: web::Data<StandIn>,
) -> HttpResponse {
    if !app.csrf_ok(&req, &form.csrfmiddlewaretoken) {
        return HttpResponse::Forbidden().body("CSRF verification failed. Request aborted.");
    }
    let author = match app.current_user(&req) {
        Some(user) => user,
        None if app.config.require_login => return HttpResponse::Unauthorized().finish(),
        None => "anonymous".to_string(),
    };
    app.posts.lock().unwrap().push((author, form.title.clone()));
    HttpResponse::Created().finish()
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub settings: Settings,
    pub stand_in: web::Data<StandIn>,
}

impl TestApp {
    pub fn harness(&self) -> Harness {
        Harness::new(&self.settings.application).expect("Failed to build harness.")
    }

    pub async fn fixture(&self) -> Fixture {
        Fixture::build(&self.settings)
            .await
            .expect("Failed to build fixture.")
    }

    pub fn admin(&self) -> Credentials {
        self.settings.credentials.admin.clone().into()
    }

    pub fn user(&self) -> Credentials {
        self.settings.credentials.user.clone().into()
    }

    pub fn is_admin(&self, user_name: &str) -> Option<bool> {
        self.stand_in
            .accounts
            .lock()
            .unwrap()
            .get(user_name)
            .map(|account| account.is_admin)
    }

    pub fn post_titles(&self) -> Vec<(String, String)> {
        self.stand_in.posts.lock().unwrap().clone()
    }
}

/// Credentials nobody has registered yet.
pub fn generate_credentials() -> Credentials {
    let name = Uuid::new_v4().to_string();
    Credentials {
        email: format!("{name}@test.org"),
        user_name: name,
        password: SecretString::new(Uuid::new_v4().to_string().into()),
        is_admin: false,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(StandInConfig::default()).await
}

pub async fn spawn_app_with(config: StandInConfig) -> TestApp {
    LazyLock::force(&TRACING);

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port.");
    let port = listener.local_addr().unwrap().port();
    let stand_in = web::Data::new(StandIn::new(config));

    let app_data = stand_in.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_data.clone())
            .route("/accounts/login/", web::get().to(login_page))
            .route("/accounts/login/", web::post().to(login))
            .route("/app/createUser", web::post().to(create_user))
            .route("/app/new", web::get().to(new_post_page))
            .route("/app/createPost", web::post().to(create_post))
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to listen.")
    .run();
    let _ = tokio::spawn(server);

    let address = format!("http://127.0.0.1:{port}");
    let settings = {
        let mut c = get_configuration().expect("Failed to read configuration.");
        c.application.base_url = address.clone();
        c.server = None;
        c
    };

    TestApp {
        address,
        port,
        settings,
        stand_in,
    }
}

/// A port that nothing is listening on.
pub fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port.");
    listener.local_addr().unwrap().port()
}
