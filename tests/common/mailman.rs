//! Stateful mock of a Mailman 2 web admin interface
//!
//! Each list mounted on the server keeps its own roster and templates, so a
//! subscribe submitted through the admin form shows up on the next roster
//! page the way it does on a real server.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Server-side state of one list
#[derive(Debug, Default)]
pub struct ListState {
    /// Subscribed addresses
    pub members: BTreeSet<String>,
    /// Welcome template
    pub welcome: String,
    /// Goodbye template
    pub goodbye: String,
    /// Login attempts seen
    pub logins: usize,
    /// Accepted mutating submissions
    pub mutations: usize,
    /// Answer roster requests with HTTP 500
    pub roster_down: bool,
}

/// Handle on a list mounted on a [`MockMailman`]
#[derive(Clone, Debug)]
pub struct MockList {
    name: String,
    password: String,
    state: Arc<Mutex<ListState>>,
}

impl MockList {
    /// List name on the server
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current members, sorted
    pub fn members(&self) -> Vec<String> {
        self.state.lock().unwrap().members.iter().cloned().collect()
    }

    /// Number of login attempts
    pub fn logins(&self) -> usize {
        self.state.lock().unwrap().logins
    }

    /// Number of accepted mutations
    pub fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    /// Current welcome template
    pub fn welcome(&self) -> String {
        self.state.lock().unwrap().welcome.clone()
    }

    /// Current goodbye template
    pub fn goodbye(&self) -> String {
        self.state.lock().unwrap().goodbye.clone()
    }

    /// Make roster requests fail (or succeed again)
    pub fn set_roster_down(&self, down: bool) {
        self.state.lock().unwrap().roster_down = down;
    }

    /// Replace a member directly on the server
    pub fn insert_member(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .members
            .insert(address.to_lowercase());
    }

    /// Drop a member directly on the server
    pub fn remove_member(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .members
            .remove(&address.to_lowercase());
    }

    fn admin_path(&self) -> String {
        format!("/mailman/admin/{}", self.name)
    }

    fn login_page(&self) -> String {
        format!(
            r#"<html><head><title>{name} Administrator Authentication</title></head><body>
<form method="post" action="{admin}">
<table><tr><td>List Administrator Password:</td>
<td><input type="password" name="adminpw" size="30"></td></tr>
<tr><td colspan=2><input type="submit" name="admlogin" value="Let me in..."></td></tr>
</table></form></body></html>"#,
            name = self.name,
            admin = self.admin_path()
        )
    }

    fn roster_page(&self) -> String {
        let state = self.state.lock().unwrap();
        let items: String = state
            .members
            .iter()
            .map(|m| {
                format!(
                    "<li><a href=\"../options/{}/{}\">{}</a>\n",
                    self.name,
                    m.replace('@', "--at--"),
                    m.replace('@', " at ")
                )
            })
            .collect();
        format!(
            "<html><body><h2>{} subscribers</h2>\n<ul>\n{}</ul></body></html>",
            self.name, items
        )
    }

    fn members_page(&self, action: &str, field: &str) -> String {
        format!(
            r#"<html><body>
<form method="post" action="{action}">
<input type="hidden" name="csrf_token" value="c5rf">
<input type="radio" name="send_welcome_msg_to_this_batch" value="0" checked>
<input type="radio" name="send_welcome_msg_to_this_batch" value="1">
<textarea name="{field}" rows="10" cols="60"></textarea>
<input type="submit" name="setmemberopts_btn" value="Submit Your Changes">
</form></body></html>"#
        )
    }

    fn template_page(&self, field: &str) -> String {
        let state = self.state.lock().unwrap();
        let text = if field == "welcome_msg" {
            &state.welcome
        } else {
            &state.goodbye
        };
        format!(
            r#"<html><body>
<form method="post" action="{admin}/general">
<textarea name="{field}" rows="10" cols="40">
{text}</textarea>
<input type="submit" name="submit" value="Submit Your Changes">
</form></body></html>"#,
            admin = self.admin_path(),
            text = escape(text)
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn form_fields(request: &Request) -> Vec<(String, String)> {
    url::form_urlencoded::parse(&request.body)
        .into_owned()
        .collect()
}

fn field(request: &Request, name: &str) -> Option<String> {
    form_fields(request)
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

#[derive(Clone, Copy, Debug)]
enum Page {
    LoginForm,
    Login,
    Roster,
    AddForm,
    Add,
    RemoveForm,
    Remove,
    TemplateForm,
    TemplateUpdate,
}

struct ListResponder {
    list: MockList,
    page: Page,
}

impl Respond for ListResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let list = &self.list;
        let html = |body: String| ResponseTemplate::new(200).set_body_string(body);

        match self.page {
            Page::LoginForm => html(list.login_page()),
            Page::Login => {
                list.state.lock().unwrap().logins += 1;
                if field(request, "adminpw").as_deref() == Some(list.password.as_str()) {
                    html(format!(
                        "<html><body><h1>{} Administration</h1></body></html>",
                        list.name
                    ))
                    .insert_header(
                        "set-cookie",
                        format!("{}+admin=s3ss10n; Path=/mailman", list.name).as_str(),
                    )
                } else {
                    html(list.login_page())
                }
            }
            Page::Roster => {
                if list.state.lock().unwrap().roster_down {
                    ResponseTemplate::new(500).set_body_string("Internal Server Error")
                } else {
                    html(list.roster_page())
                }
            }
            Page::AddForm => html(list.members_page("add", "subscribees")),
            Page::RemoveForm => html(list.members_page("remove", "unsubscribees")),
            Page::Add | Page::Remove => {
                let name = match self.page {
                    Page::Add => "subscribees",
                    _ => "unsubscribees",
                };
                let addresses: Vec<String> = field(request, name)
                    .unwrap_or_default()
                    .lines()
                    .map(|l| l.trim().to_lowercase())
                    .filter(|l| !l.is_empty())
                    .collect();

                let mut state = list.state.lock().unwrap();
                state.mutations += 1;
                for address in addresses {
                    match self.page {
                        Page::Add => state.members.insert(address),
                        _ => state.members.remove(&address),
                    };
                }
                html("<html><body>Successfully processed</body></html>".to_string())
            }
            Page::TemplateForm => {
                let wanted = request
                    .url
                    .query_pairs()
                    .find(|(key, _)| key == "VARHELP")
                    .map(|(_, value)| value.into_owned())
                    .unwrap_or_default();
                match wanted.as_str() {
                    "general/welcome_msg" => html(list.template_page("welcome_msg")),
                    "general/goodbye_msg" => html(list.template_page("goodbye_msg")),
                    _ => ResponseTemplate::new(404),
                }
            }
            Page::TemplateUpdate => {
                let mut state = list.state.lock().unwrap();
                state.mutations += 1;
                for (key, value) in form_fields(request) {
                    match key.as_str() {
                        "welcome_msg" => state.welcome = value,
                        "goodbye_msg" => state.goodbye = value,
                        _ => {}
                    }
                }
                html("<html><body>Changes saved</body></html>".to_string())
            }
        }
    }
}

/// Mock admin server hosting any number of lists below `/mailman`
pub struct MockMailman {
    server: MockServer,
}

impl MockMailman {
    /// Start an empty server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to use as `listservers.*.url`
    pub fn base_url(&self) -> String {
        format!("{}/mailman", self.server.uri())
    }

    /// Mount a list with `password` and initial `members`
    pub async fn add_list(&self, name: &str, password: &str, members: &[&str]) -> MockList {
        let state = ListState {
            members: members.iter().map(|m| m.to_lowercase()).collect(),
            welcome: format!("Welcome to {}!", name),
            goodbye: format!("Goodbye from {}.", name),
            ..ListState::default()
        };
        let list = MockList {
            name: name.to_string(),
            password: password.to_string(),
            state: Arc::new(Mutex::new(state)),
        };

        let admin = list.admin_path();
        let routes = [
            ("GET", admin.clone(), Page::LoginForm),
            ("POST", admin.clone(), Page::Login),
            ("GET", format!("/mailman/roster/{}", name), Page::Roster),
            ("GET", format!("{}/members/add", admin), Page::AddForm),
            ("POST", format!("{}/members/add", admin), Page::Add),
            ("GET", format!("{}/members/remove", admin), Page::RemoveForm),
            ("POST", format!("{}/members/remove", admin), Page::Remove),
            ("GET", format!("{}/", admin), Page::TemplateForm),
            ("POST", format!("{}/general", admin), Page::TemplateUpdate),
        ];
        for (verb, route, page) in routes {
            Mock::given(method(verb))
                .and(path(route.as_str()))
                .respond_with(ListResponder {
                    list: list.clone(),
                    page,
                })
                .mount(&self.server)
                .await;
        }

        list
    }
}
