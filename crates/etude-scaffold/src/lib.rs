//! A minimal Etude application.
//!
//! Every handler is registered twice over the same functions: once in the
//! code-defined [`routes`] table and once by name in [`registry`] for
//! `routes.toml`, so both route sources serve the same pages.

use etude_core::cookie::CookieOptions;
use etude_core::prelude::*;

/// Cookie holding the visitor's colour theme (unsigned, cosmetic only).
pub const THEME_COOKIE: &str = "theme";

const THEMES: [&str; 2] = ["light", "dark"];

type HandlerResult = Result<Response, EtudeError>;

#[derive(Debug, Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct ThemeForm {
    theme: String,
}

fn page(title: &str, body: &str) -> Response {
    Response::html(format!(
        "<!DOCTYPE html>\n<html><head><title>{}</title></head><body>\n<h1>{}</h1>\n{}\n</body></html>\n",
        escape_html(title),
        escape_html(title),
        body
    ))
}

pub fn index(ctx: &mut RequestContext) -> HandlerResult {
    let who = match ctx.user() {
        Some(user) => format!(
            "<p>Signed in as {}. <a href=\"/home\">Home</a></p>",
            escape_html(&user.name)
        ),
        None => "<p><a href=\"/login\">Log in</a></p>".to_string(),
    };
    Ok(page("Etude", &who))
}

fn login_page(ctx: &RequestContext, message: Option<&str>) -> Response {
    let message = message
        .map(|m| format!("<p class=\"error\">{}</p>", escape_html(m)))
        .unwrap_or_default();
    page(
        "Log in",
        &format!(
            "{}<form method=\"post\" action=\"/login\">\n{}\n\
             <input name=\"username\" />\n\
             <input name=\"password\" type=\"password\" />\n\
             <button>Log in</button>\n</form>",
            message,
            ctx.xsrf_field()
        ),
    )
}

pub fn login_form(ctx: &mut RequestContext) -> HandlerResult {
    if ctx.principal().is_authenticated() {
        return Ok(Response::redirect("/home"));
    }
    Ok(login_page(ctx, None))
}

/// Log in, creating the account on first use.
pub fn login(ctx: &mut RequestContext) -> HandlerResult {
    if ctx.principal().is_authenticated() {
        return Ok(Response::redirect("/home"));
    }
    let creds: Credentials = ctx.form_as()?;
    if creds.username.trim().is_empty() || creds.password.is_empty() {
        return Ok(login_page(ctx, Some("Username and password are required")).with_status(400));
    }

    let user = match ctx.identity().find_by_name(&creds.username) {
        Ok(_) => match ctx.identity().authenticate(&creds.username, &creds.password) {
            Ok(user) => user,
            Err(EtudeError::Unauthorized(_)) => {
                return Ok(
                    login_page(ctx, Some("Wrong username/password combination")).with_status(401)
                );
            }
            Err(e) => return Err(e),
        },
        Err(EtudeError::UserNotFound(_)) => {
            ctx.identity().create_user(&creds.username, &creds.password)?
        }
        Err(e) => return Err(e),
    };

    ctx.login(&user)?;
    tracing::info!(user_id = user.id, "User logged in");
    Ok(Response::redirect("/home"))
}

pub fn logout(ctx: &mut RequestContext) -> HandlerResult {
    ctx.logout()?;
    Ok(Response::redirect("/"))
}

pub fn home(ctx: &mut RequestContext) -> HandlerResult {
    let name = ctx.user().map(|u| u.name.clone()).unwrap_or_default();
    let theme = ctx
        .request()
        .cookie(THEME_COOKIE)
        .filter(|t| THEMES.contains(&t.as_str()))
        .unwrap_or_else(|| "light".to_string());
    let field = ctx.xsrf_field();
    let body = format!(
        "<p>Welcome, {name}. Theme: {theme}.</p>\n\
         <form method=\"post\" action=\"/home/create\">{field}\
         <select name=\"theme\"><option>light</option><option>dark</option></select>\
         <button>Save theme</button></form>\n\
         <form method=\"post\" action=\"/home/delete\">{field}<button>Forget theme</button></form>\n\
         <form method=\"post\" action=\"/home/update\">{field}<button>Sign out other devices</button></form>\n\
         <form method=\"post\" action=\"/logout\">{field}<button>Log out</button></form>",
        name = escape_html(&name),
        theme = theme,
        field = field,
    );
    Ok(page("Home", &body))
}

/// Remember a colour theme.
pub fn create(ctx: &mut RequestContext) -> HandlerResult {
    let form: ThemeForm = ctx.form_as()?;
    if !THEMES.contains(&form.theme.as_str()) {
        return Err(EtudeError::BadRequest(format!("unknown theme `{}`", form.theme)));
    }
    ctx.cookies().add(
        THEME_COOKIE,
        form.theme,
        CookieOptions::default().max_age(30 * 24 * 3600),
    )?;
    Ok(Response::redirect("/home"))
}

/// Invalidate every identity cookie of the current user, then log this
/// client back in with a fresh one.
pub fn update(ctx: &mut RequestContext) -> HandlerResult {
    let Some(user_id) = ctx.user().map(|u| u.id) else {
        return Err(EtudeError::Unauthorized("Login required".to_string()));
    };
    ctx.identity().revoke_sessions(user_id)?;
    let user = ctx
        .identity()
        .users()
        .find_user_by_id(user_id)?
        .ok_or_else(|| EtudeError::UserNotFound(user_id.to_string()))?;
    ctx.login(&user)?;
    Ok(Response::redirect("/home"))
}

pub fn delete(ctx: &mut RequestContext) -> HandlerResult {
    ctx.cookies().delete(THEME_COOKIE)?;
    Ok(Response::redirect("/home"))
}

pub fn not_found(ctx: &mut RequestContext) -> HandlerResult {
    let path = ctx.request().path.clone();
    Ok(page("Not found", &format!("<p>No page at {}</p>", escape_html(&path))).with_status(404))
}

/// The scaffold's routes, in matching order.
pub fn routes() -> RouteTableBuilder {
    RouteTable::builder()
        .get("/", index)
        .get("/login", login_form)
        .post("/login", login)
        .xsrf()
        .post("/logout", logout)
        .xsrf()
        .get("/home", home)
        .login_required()
        .post("/home/create", create)
        .login_required()
        .xsrf()
        .post("/home/update", update)
        .login_required()
        .xsrf()
        .post("/home/delete", delete)
        .login_required()
        .xsrf()
        .get("/{*path}", not_found)
}

/// The same handlers by name, for `routes.toml`.
pub fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register("index", index)
        .register("login_form", login_form)
        .register("login", login)
        .register("logout", logout)
        .register("home", home)
        .register("create", create)
        .register("update", update)
        .register("delete", delete)
        .register("not_found", not_found);
    registry
}
