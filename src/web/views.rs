//! Server-rendered HTML pages

use super::pages::MemberView;
use crate::logging::LogEntry;
use crate::models::{Identity, Notification, NotificationLevel};
use crate::server_status::ServerStatus;
use crate::state::ApplicationSubmission;

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn layout(
    title: &str,
    user: Option<&Identity>,
    notifications: &[Notification],
    body: &str,
) -> String {
    let nav_user = match user {
        Some(identity) => {
            let avatar = identity
                .avatar_url()
                .map(|url| format!(r#"<img class="avatar" src="{}" alt="">"#, html_escape(&url)))
                .unwrap_or_default();
            format!(
                r#"{avatar}<span class="username">{name}</span>
            <a href="/dashboard">Dashboard</a>
            <a href="/logout">Logout</a>"#,
                avatar = avatar,
                name = html_escape(&identity.display_name)
            )
        }
        None => r#"<a href="/login" class="discord-btn">Login</a>"#.to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="/css/style.css">
</head>
<body>
    <nav>
        <a href="/" class="brand">Community</a>
        <a href="/rules">Rules</a>
        <a href="/faq">FAQ</a>
        <span class="spacer"></span>
        {nav_user}
    </nav>
    {notifications}
    <main>
{body}
    </main>
    <script src="/js/main.js" defer></script>
</body>
</html>"#,
        title = html_escape(title),
        nav_user = nav_user,
        notifications = notifications_html(notifications),
        body = body
    )
}

fn notifications_html(notifications: &[Notification]) -> String {
    if notifications.is_empty() {
        return String::new();
    }

    let items: Vec<String> = notifications
        .iter()
        .map(|n| {
            let class = match n.level {
                NotificationLevel::Success => "success",
                NotificationLevel::Info => "info",
                NotificationLevel::Error => "error",
            };
            format!(
                r#"<div class="notification {}">{}</div>"#,
                class,
                html_escape(&n.message)
            )
        })
        .collect();

    format!(r#"<div class="notifications">{}</div>"#, items.join("\n"))
}

/// Status block that `main.js` keeps refreshed
fn status_html(status: &ServerStatus) -> String {
    let inner = if status.online {
        format!(
            r#"<div class="status online">
            <p>Server is ONLINE</p>
            <p>Players: {}/{}</p>
            <p>{}</p>
        </div>"#,
            status.players,
            status.max_players,
            html_escape(status.hostname.as_deref().unwrap_or_default())
        )
    } else {
        r#"<div class="status offline"><p>Server is OFFLINE</p></div>"#.to_string()
    };

    format!(r#"<section class="server-status">{}</section>"#, inner)
}

fn member_summary(view: &MemberView) -> String {
    let server = match &view.server {
        Some(guild) => {
            let icon = guild
                .icon_url()
                .map(|url| {
                    format!(r#"<img class="guild-icon" src="{}" alt="">"#, html_escape(&url))
                })
                .unwrap_or_default();
            format!(
                r#"<div class="guild">{}<strong>{}</strong></div>"#,
                icon,
                html_escape(&guild.name)
            )
        }
        None => concat!(
            r#"<div class="guild missing">"#,
            "You are not a member of our Discord server yet.</div>"
        )
        .to_string(),
    };

    let whitelist = if view.roles.is_whitelisted {
        r#"<span class="badge whitelisted">Whitelisted</span>"#
    } else {
        r#"<span class="badge not-whitelisted">Not whitelisted</span>"#
    };

    let priority = match view.roles.tier_label() {
        Some(label) => format!(r#"<span class="badge priority">{}</span>"#, label),
        None => r#"<span class="badge">No queue priority</span>"#.to_string(),
    };

    format!(
        r#"<section class="member-summary">
        {server}
        <p>Members: <strong>{count}</strong></p>
        <p>{whitelist} {priority}</p>
    </section>
    {status}"#,
        server = server,
        count = view.member_count,
        whitelist = whitelist,
        priority = priority,
        status = status_html(&view.status)
    )
}

pub fn home_page(user: Option<&Identity>, is_whitelisted: bool, status: &ServerStatus) -> String {
    let welcome = match user {
        Some(identity) if is_whitelisted => format!(
            "<p>Welcome back, {}. You are whitelisted and ready to play.</p>",
            html_escape(&identity.display_name)
        ),
        Some(identity) => format!(
            concat!(
                "<p>Welcome, {}. You are not whitelisted yet. ",
                r#"<a href="/whitelistform">Apply here</a>.</p>"#
            ),
            html_escape(&identity.display_name)
        ),
        None => r#"<p><a href="/login">Log in with Discord</a> to apply for the whitelist.</p>"#
            .to_string(),
    };

    let body = format!(
        "<h1>Welcome to the Community</h1>\n{}\n{}",
        welcome,
        status_html(status)
    );
    layout("Home", user, &[], &body)
}

pub fn login_page(user: Option<&Identity>, notifications: &[Notification]) -> String {
    let body = match user {
        Some(identity) => format!(
            r#"<h1>Already logged in</h1>
        <p>You are logged in as {}. <a href="/dashboard">Go to your dashboard</a>.</p>"#,
            html_escape(&identity.display_name)
        ),
        None => r#"<h1>Login</h1>
        <p>Sign in with Discord to access the community portal.</p>
        <a href="/auth/discord" class="discord-btn">Login with Discord</a>"#
            .to_string(),
    };
    layout("Login", user, notifications, &body)
}

pub fn dashboard_page(view: &MemberView) -> String {
    let body = format!(
        r#"<h1>Dashboard</h1>
    {}
    <section class="actions">
        <a href="/applications-form">Submit an application</a>
        <a href="/whitelistform">Whitelist form</a>
    </section>"#,
        member_summary(view)
    );
    layout("Dashboard", Some(&view.identity), &view.notifications, &body)
}

pub fn rules_page(view: &MemberView) -> String {
    let body = format!(
        r#"<h1>Server Rules</h1>
    {}
    <ol class="rules">
        <li>Stay in character. Out-of-character talk belongs in OOC channels.</li>
        <li>No metagaming: information learned outside the game stays outside the game.</li>
        <li>No FailRP: play your character realistically and value your life.</li>
        <li>No random deathmatch. Every conflict needs roleplay leading up to it.</li>
        <li>Report rule breaks to staff instead of retaliating in game.</li>
    </ol>"#,
        member_summary(view)
    );
    layout("Rules", Some(&view.identity), &view.notifications, &body)
}

/// Application form; `/applications-form` and `/whitelistform` share it
pub fn application_form_page(view: &MemberView, heading: &str) -> String {
    let textarea = |name: &str, label: &str| {
        format!(
            r#"<label for="{name}">{label}</label>
        <textarea id="{name}" name="{name}" rows="4"></textarea>"#,
            name = name,
            label = label
        )
    };
    let input = |name: &str, label: &str, value: &str| {
        format!(
            r#"<label for="{name}">{label}</label>
        <input id="{name}" name="{name}" type="text" value="{value}">"#,
            name = name,
            label = label,
            value = html_escape(value)
        )
    };

    let fields = [
        input("discord_id", "Discord ID", view.identity.id.as_str()),
        input("name", "Discord name", view.identity.username.as_str()),
        textarea("ooc_info", "Tell us about yourself (OOC)"),
        input("age", "Age", ""),
        input("region", "Region", ""),
        textarea("experience", "Roleplay experience"),
        textarea("whyApply", "Why do you want to join?"),
        input("stream", "Do you stream? (link)", ""),
        textarea("backstory", "Character backstory"),
        textarea("metagaming", "What is metagaming?"),
        textarea("failrp", "What is FailRP?"),
        textarea("scenario1", "Scenario 1: you are robbed at gunpoint. What do you do?"),
        textarea("scenario2", "Scenario 2: a police chase ends in a crash. What do you do?"),
        textarea("rulebreak", "You see another player break a rule. What do you do?"),
        input("rulesLocation", "Where can the rules be found?", ""),
    ];

    let body = format!(
        r#"<h1>{heading}</h1>
    {summary}
    <form method="post" action="/submit-application" class="application-form">
        {fields}
        <button type="submit">Submit application</button>
    </form>"#,
        heading = html_escape(heading),
        summary = member_summary(view),
        fields = fields.join("\n        ")
    );
    layout(heading, Some(&view.identity), &view.notifications, &body)
}

pub fn application_submitted_page(
    user: Option<&Identity>,
    notifications: &[Notification],
) -> String {
    let body = r#"<h1>Application received</h1>
    <p>Thanks! Staff will review your application and reach out on Discord.</p>
    <a href="/dashboard">Back to dashboard</a>"#;
    layout("Application submitted", user, notifications, body)
}

pub fn faq_page(user: Option<&Identity>) -> String {
    let body = r#"<h1>Frequently Asked Questions</h1>
    <dl class="faq">
        <dt>How do I get whitelisted?</dt>
        <dd>Log in with Discord, fill out the whitelist form and wait for staff to review it.</dd>
        <dt>How long does a review take?</dt>
        <dd>Usually a few days. You will be contacted on Discord.</dd>
        <dt>What is queue priority?</dt>
        <dd>Supporters with a priority role skip ahead in the connection queue.</dd>
        <dt>I was denied. Can I apply again?</dt>
        <dd>Yes, after reading the rules again and improving your answers.</dd>
    </dl>"#;
    layout("FAQ", user, &[], body)
}

pub fn admin_page(
    admin: &Identity,
    applications: &[ApplicationSubmission],
    notifications: &[Notification],
) -> String {
    let show = |value: &Option<String>| html_escape(value.as_deref().unwrap_or("N/A"));

    let rows: Vec<String> = applications
        .iter()
        .map(|app| {
            format!(
                r#"<article class="application" data-id="{id}">
        <header>
            <strong>{name}</strong> <code>{discord_id}</code>
            <time datetime="{submitted}">{submitted_display}</time>
        </header>
        <dl>
            <dt>OOC info</dt><dd>{ooc}</dd>
            <dt>Age</dt><dd>{age}</dd>
            <dt>Region</dt><dd>{region}</dd>
            <dt>Experience</dt><dd>{experience}</dd>
            <dt>Why apply</dt><dd>{why}</dd>
            <dt>Stream</dt><dd>{stream}</dd>
            <dt>Backstory</dt><dd>{backstory}</dd>
            <dt>Metagaming</dt><dd>{metagaming}</dd>
            <dt>FailRP</dt><dd>{failrp}</dd>
            <dt>Scenario 1</dt><dd>{scenario1}</dd>
            <dt>Scenario 2</dt><dd>{scenario2}</dd>
            <dt>Rule break</dt><dd>{rulebreak}</dd>
            <dt>Rules location</dt><dd>{rules_location}</dd>
        </dl>
    </article>"#,
                id = app.id,
                name = show(&app.discord_name),
                discord_id = show(&app.discord_id),
                submitted = app.submitted_at.to_rfc3339(),
                submitted_display = app.submitted_at.format("%Y-%m-%d %H:%M UTC"),
                ooc = show(&app.ooc_info),
                age = show(&app.age),
                region = show(&app.region),
                experience = show(&app.experience),
                why = show(&app.why_apply),
                stream = show(&app.stream),
                backstory = show(&app.backstory),
                metagaming = show(&app.metagaming),
                failrp = show(&app.failrp),
                scenario1 = show(&app.scenario1),
                scenario2 = show(&app.scenario2),
                rulebreak = show(&app.rulebreak),
                rules_location = show(&app.rules_location),
            )
        })
        .collect();

    let listing = if rows.is_empty() {
        "<p>No applications yet.</p>".to_string()
    } else {
        rows.join("\n")
    };

    let body = format!(
        r#"<h1>Admin Panel</h1>
    <p>{count} applications, newest first. <a href="/admin/logs">View logs</a></p>
    {listing}"#,
        count = applications.len(),
        listing = listing
    );
    layout("Admin", Some(admin), notifications, &body)
}

pub fn logs_page(admin: &Identity, entries: &[LogEntry]) -> String {
    let lines: Vec<String> = entries
        .iter()
        .map(|entry| {
            let level_class = match entry.level.as_str() {
                "ERROR" => "error",
                "WARN" => "warn",
                "INFO" => "info",
                "DEBUG" => "debug",
                _ => "trace",
            };
            format!(
                r#"<div class="log-entry {}">{}</div>"#,
                level_class,
                html_escape(&entry.format())
            )
        })
        .collect();

    let body = format!(
        r#"<h1>Logs</h1>
    <div id="logs" class="logs" data-stream="/admin/logs/stream">
{}
    </div>"#,
        lines.join("\n")
    );
    layout("Logs", Some(admin), &[], &body)
}

pub fn access_denied_page(user: Option<&Identity>) -> String {
    let body = r#"<h1>Access Denied</h1>
    <p>You do not have permission to view this page.</p>"#;
    layout("Access Denied", user, &[], body)
}

pub fn not_found_page(user: Option<&Identity>) -> String {
    let body = r#"<h1>404</h1>
    <p>The page you are looking for does not exist. <a href="/">Go home</a>.</p>"#;
    layout("Not Found", user, &[], body)
}
