//! Server-rendered pages. Templates are bundled into the binary; the map
//! itself is drawn in the browser by `static/dashboard.js` from the view
//! JSON embedded in the page.

use crate::config::GeolocationMode;
use crate::render::{DashboardView, LoginView};
use crate::session::Notice;
use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

const LAYOUT_HEAD: &str = r#"<!doctype html>
<html lang="fr">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{title}}</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" crossorigin="" />
  <link rel="stylesheet" href="/static/dashboard.css" />
</head>"#;

const LOGIN_TEMPLATE: &str = r#"{{> head}}
<body class="login">
  <main class="login-card">
    {{#if has_logo}}<img class="logo" src="/logo.png" alt="logo" />{{/if}}
    <h1>{{title}}</h1>
    {{#if warning}}<p class="alert alert-warning">{{warning}}</p>{{/if}}
    <form method="post" action="/login">
      <label for="password">Mot de passe</label>
      <input id="password" name="password" type="password" autocomplete="current-password" required autofocus />
      <button type="submit">Se connecter</button>
    </form>
  </main>
</body>
</html>
"#;

const DASHBOARD_TEMPLATE: &str = r#"{{> head}}
<body class="dashboard">
  <aside class="sidebar">
    {{#if has_logo}}<img class="logo" src="/logo.png" alt="logo" />{{/if}}
    <h1>{{title}}</h1>
    <form method="post" action="/logout" class="logout"><button type="submit">Se déconnecter</button></form>

    <form method="post" action="/select" class="filters">
      {{#each levels}}
      <label for="{{name}}">{{label}}</label>
      <select id="{{name}}" name="{{name}}" onchange="this.form.submit()">
        {{#each options}}<option value="{{value}}"{{#if selected}} selected{{/if}}>{{value}}</option>{{/each}}
      </select>
      {{/each}}
      <noscript><button type="submit">Filtrer</button></noscript>
    </form>

    <section class="upload">
      <h2>Points (CSV)</h2>
      <form method="post" action="/upload" enctype="multipart/form-data">
        <input type="file" name="file" accept=".csv,text/csv" required />
        <button type="submit">Charger</button>
      </form>
      {{#if point_count}}
      <form method="post" action="/overlay/clear"><button type="submit">Effacer les points ({{point_count}})</button></form>
      {{/if}}
      {{#if notice_success}}<p class="alert alert-success">{{notice_success}}</p>{{/if}}
      {{#if notice_error}}<p class="alert alert-error">{{notice_error}}</p>{{/if}}
    </section>

    <section class="position">
      <h2>Ma position</h2>
      {{#if query_geolocation}}
      <button type="button" id="get-position">📍 Obtenir ma position</button>
      {{else}}
      <p class="hint">Utilisez le bouton de localisation sur la carte.</p>
      {{/if}}
      {{#if position}}
      <p class="alert alert-success">Votre position : {{position.lat}}, {{position.lon}}{{#if position.area_id}} (zone {{position.area_id}}){{/if}}</p>
      {{/if}}
      {{#each page_warnings}}<p class="alert alert-warning">{{this}}</p>{{/each}}
    </section>
  </aside>
  <main class="map-pane">
    {{#each warnings}}<p class="alert alert-info">{{this}}</p>{{/each}}
    <div id="map"></div>
  </main>
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js" crossorigin=""></script>
  <script>window.DASHBOARD = {{{view_json}}};</script>
  <script src="/static/dashboard.js"></script>
</body>
</html>
"#;

pub struct Pages {
    registry: Handlebars<'static>,
}

#[derive(Serialize)]
struct SelectOption<'a> {
    value: &'a str,
    selected: bool,
}

#[derive(Serialize)]
struct SelectLevel<'a> {
    name: &'static str,
    label: &'static str,
    options: Vec<SelectOption<'a>>,
}

fn level<'a>(name: &'static str, label: &'static str, options: &'a [String], selected: Option<&str>) -> SelectLevel<'a> {
    SelectLevel {
        name,
        label,
        options: options
            .iter()
            .map(|value| SelectOption {
                value,
                selected: Some(value.as_str()) == selected,
            })
            .collect(),
    }
}

impl Pages {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry
            .register_partial("head", LAYOUT_HEAD)
            .context("Failed to register page head")?;
        registry
            .register_template_string("login", LOGIN_TEMPLATE)
            .context("Failed to register login template")?;
        registry
            .register_template_string("dashboard", DASHBOARD_TEMPLATE)
            .context("Failed to register dashboard template")?;
        Ok(Self { registry })
    }

    pub fn login(&self, view: &LoginView) -> Result<String> {
        self.registry
            .render("login", view)
            .context("Failed to render login page")
    }

    /// `page_warnings` are one-off messages for this request only, such as
    /// unparseable position parameters.
    pub fn dashboard(&self, view: &DashboardView, page_warnings: &[String]) -> Result<String> {
        let options = &view.options;
        let selection = &view.selection;
        let levels = vec![
            level("region", "Région", &options.regions, selection.region.as_deref()),
            level("cercle", "Cercle", &options.cercles, selection.cercle.as_deref()),
            level("commune", "Commune", &options.communes, selection.commune.as_deref()),
            level("area", "Zone de dénombrement (SE)", &options.areas, selection.area.as_deref()),
        ];

        let (notice_success, notice_error) = match &view.overlay_notice {
            Some(Notice::Success(msg)) => (Some(msg.as_str()), None),
            Some(Notice::Error(msg)) => (None, Some(msg.as_str())),
            None => (None, None),
        };

        let view_json = script_json(view)?;
        let context = json!({
            "title": view.title,
            "has_logo": view.has_logo,
            "levels": levels,
            "point_count": view.points.len(),
            "notice_success": notice_success,
            "notice_error": notice_error,
            "query_geolocation": view.geolocation == GeolocationMode::Query,
            "position": view.position,
            "warnings": view.warnings,
            "page_warnings": page_warnings,
            "view_json": view_json,
        });

        self.registry
            .render("dashboard", &context)
            .context("Failed to render dashboard page")
    }
}

// JSON placed inside a <script> element must not be able to close it.
fn script_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).context("Failed to serialise view")?;
    Ok(json.replace("</", "<\\/"))
}
