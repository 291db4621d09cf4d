//! Built-in migrations for persisted API-client workspace data.
//!
//! - `0.0.0`: every table is a map keyed by uid, request trees are built from
//!   `folders`.
//! - `2.1.0`: tables are arrays, folders became tags, collections carry
//!   flattened `requests`/`tags` lists and their own `auth`.
//! - `2.2.0`: collections carry watch-mode state, OAuth2 schemes hold a
//!   `flows` map and request-example rows carry `enabled`.
//!
//! Uid links between entities survive both steps.

use indexmap::IndexSet;
use serde_json::{json, Map, Value};

use super::{Fingerprint, MigrationError, MigrationStep, Migrator, StepError, Version};

pub const V0_0_0: Version = Version::new(0, 0, 0);
pub const V2_1_0: Version = Version::new(2, 1, 0);
pub const V2_2_0: Version = Version::new(2, 2, 0);

/// The tables every migrated data set contains.
pub const TABLES: [&str; 9] = [
    "collections",
    "cookies",
    "environments",
    "requestExamples",
    "requests",
    "securitySchemes",
    "servers",
    "tags",
    "workspaces",
];

/// A [`Migrator`] with both built-in steps and their fingerprints.
///
/// # Errors
///
/// Returns the [`MigrationError`] raised while registering the steps.
pub fn migrator() -> Result<Migrator, MigrationError> {
    let migrator = Migrator::new()
        .register(MigrationStep::new(V0_0_0, V2_1_0, migrate_v2_1_0))?
        .register(MigrationStep::new(V2_1_0, V2_2_0, migrate_v2_2_0))?
        .with_fingerprint(Fingerprint {
            version: V0_0_0,
            name: "uid-keyed tables",
            matches: is_v0_0_0,
        })
        .with_fingerprint(Fingerprint {
            version: V2_1_0,
            name: "collections without watch mode",
            matches: is_v2_1_0,
        })
        .with_fingerprint(Fingerprint {
            version: V2_2_0,
            name: "collections with watch mode",
            matches: is_v2_2_0,
        });
    Ok(migrator)
}

fn is_v0_0_0(data: &Value) -> bool {
    data.get("folders").is_some_and(Value::is_object) || data.get("collections").is_some_and(Value::is_object)
}

fn is_v2_1_0(data: &Value) -> bool {
    match data.get("collections").and_then(Value::as_array) {
        Some(collections) => collections.is_empty() || collections.iter().any(|c| c.get("watchMode").is_none()),
        None => false,
    }
}

fn is_v2_2_0(data: &Value) -> bool {
    data.get("collections")
        .and_then(Value::as_array)
        .is_some_and(|collections| collections.iter().all(|c| c.get("watchMode").is_some()))
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Rows of a table stored either as a uid-keyed map or as an array.
fn rows(data: &Value, table: &str) -> Vec<Value> {
    match data.get(table) {
        Some(Value::Object(map)) => map.values().cloned().collect(),
        Some(Value::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn non_empty_or<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    match str_field(value, key) {
        "" => default,
        s => s,
    }
}

fn uid_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default()
}

fn list(set: &IndexSet<String>) -> Value {
    set.iter().cloned().collect::<Vec<_>>().into()
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `clientCredentials` becomes `Client Credentials`.
fn camel_to_title_words(s: &str) -> String {
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i > 0 && ch.is_uppercase() {
            out.push(' ');
        }
        out.push(ch);
    }
    capitalize(&out)
}

// ── 0.0.0 -> 2.1.0 ─────────────────────────────────────────────────────

#[derive(Default)]
struct Flattened {
    requests: IndexSet<String>,
    tags: IndexSet<String>,
    auth: IndexSet<String>,
}

/// Collects the requests, nested folders and security schemes below
/// `children`.
fn flatten_children(data: &Value, children: &[String], out: &mut Flattened) {
    for uid in children {
        if let Some(request) = data.get("requests").and_then(|r| r.get(uid)) {
            out.requests.insert(uid.clone());
            out.auth.extend(uid_list(request, "securitySchemeUids"));
        } else if let Some(folder) = data.get("folders").and_then(|f| f.get(uid)) {
            if out.tags.insert(uid.clone()) {
                flatten_children(data, &uid_list(folder, "childUids"), out);
            }
        }
    }
}

fn migrate_auth(scheme: &Value) -> Value {
    let flow = scheme.get("flow").unwrap_or(&Value::Null);
    match (str_field(scheme, "type"), str_field(flow, "type")) {
        ("apiKey", _) => json!({
            "type": "apiKey",
            "name": str_field(scheme, "name"),
            "value": str_field(scheme, "value"),
        }),
        ("http", _) => json!({
            "type": "http",
            "username": str_field(scheme, "value"),
            "password": str_field(scheme, "secondValue"),
            "token": str_field(scheme, "value"),
        }),
        ("oauth2", "implicit") => json!({
            "type": "oauth-implicit",
            "token": str_field(flow, "token"),
        }),
        ("oauth2", "password") => json!({
            "type": "oauth-password",
            "token": str_field(flow, "token"),
            "username": str_field(flow, "value"),
            "password": str_field(flow, "secondValue"),
            "clientSecret": str_field(flow, "clientSecret"),
        }),
        ("oauth2", kind @ ("clientCredentials" | "authorizationCode")) => json!({
            "type": format!("oauth-{kind}"),
            "token": str_field(flow, "token"),
            "clientSecret": str_field(flow, "clientSecret"),
        }),
        _ => json!({"type": "apiKey", "name": "", "value": ""}),
    }
}

fn name_key(scheme: &Value) -> String {
    match str_field(scheme, "type") {
        "apiKey" => capitalize(str_field(scheme, "in")),
        "http" => format!("{} Authentication", capitalize(str_field(scheme, "scheme"))),
        "oauth2" => camel_to_title_words(scheme.get("flow").map(|f| str_field(f, "type")).unwrap_or("")),
        "openIdConnect" => "Open ID Connect".to_string(),
        _ => "None".to_string(),
    }
}

fn migrate_flow(flow: &Value) -> Value {
    let mut out = object(flow.clone());
    out.insert("refreshUrl".into(), json!(str_field(flow, "refreshUrl")));
    out.insert(
        "selectedScopes".into(),
        flow.get("selectedScopes").cloned().unwrap_or_else(|| json!([])),
    );
    out.insert("scopes".into(), flow.get("scopes").cloned().unwrap_or_else(|| json!({})));
    let redirect = str_field(flow, "redirectUri").to_string();
    match str_field(flow, "type") {
        "implicit" => {
            out.insert("x-scalar-redirect-uri".into(), json!(redirect));
        }
        "password" | "clientCredentials" => {
            out.insert("tokenUrl".into(), json!(str_field(flow, "tokenUrl")));
        }
        _ => {
            out.insert("x-scalar-redirect-uri".into(), json!(redirect));
            out.insert("authorizationUrl".into(), json!(str_field(flow, "authorizationUrl")));
            out.insert("tokenUrl".into(), json!(str_field(flow, "tokenUrl")));
        }
    }
    out.remove("redirectUri");
    Value::Object(out)
}

fn migrate_v2_1_0(data: Value) -> Result<Value, StepError> {
    let mut request_security: Map<String, Value> = Map::new();

    let collections: Vec<Value> = rows(&data, "collections")
        .iter()
        .map(|c| {
            let children = uid_list(c, "childUids");
            let mut flat = Flattened::default();
            flatten_children(&data, &children, &mut flat);

            let mut schemes = flat.auth.clone();
            if let Some(Value::Object(dict)) = c.get("securitySchemeDict") {
                schemes.extend(dict.values().filter_map(Value::as_str).map(String::from));
            }
            for request in &flat.requests {
                request_security.insert(request.clone(), list(&schemes));
            }

            let auth: Map<String, Value> = schemes
                .iter()
                .filter_map(|uid| {
                    let scheme = data.get("securitySchemes")?.get(uid)?;
                    scheme.get("uid")?;
                    Some((uid.clone(), migrate_auth(scheme)))
                })
                .collect();

            let spec = c.get("spec").unwrap_or(&Value::Null);
            let servers = spec.get("serverUids").cloned().unwrap_or_else(|| json!([]));
            let selected_server = match str_field(c, "selectedServerUid") {
                "" => servers.get(0).and_then(Value::as_str).unwrap_or("").to_string(),
                uid => uid.to_string(),
            };
            let mut collection = json!({
                "type": "collection",
                "openapi": non_empty_or(spec, "openapi", "3.1.0"),
                "info": spec.get("info").cloned().unwrap_or_else(|| json!({"title": "OpenAPI Spec", "version": "0.0.1"})),
                "security": spec.get("security").cloned().unwrap_or_else(|| json!([])),
                "uid": c.get("uid").cloned().unwrap_or(Value::Null),
                "securitySchemes": list(&schemes),
                "selectedServerUid": selected_server,
                "servers": servers,
                "requests": list(&flat.requests),
                "tags": list(&flat.tags),
                "auth": auth,
                "children": children,
                "x-scalar-icon": "interface-content-folder",
                "liveSync": false,
            });
            if let Some(docs) = spec.get("externalDocs") {
                collection["externalDocs"] = docs.clone();
            }
            collection
        })
        .collect();

    let environments: Vec<Value> = rows(&data, "environments")
        .into_iter()
        .map(|env| {
            let value = str_field(&env, "raw").to_string();
            let mut env = object(env);
            env.remove("raw");
            env.insert("value".into(), json!(value));
            Value::Object(env)
        })
        .collect();

    let requests: Vec<Value> = rows(&data, "requests")
        .into_iter()
        .map(|request| {
            let params = request.get("parameters").unwrap_or(&Value::Null);
            let parameters: Vec<Value> = ["path", "query", "headers", "cookies"]
                .iter()
                .flat_map(|kind| rows(params, kind))
                .filter(|p| !p.is_null())
                .collect();
            let allowed = request_security
                .get(str_field(&request, "uid"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let selected: Vec<String> = uid_list(&request, "selectedSecuritySchemeUids")
                .into_iter()
                .filter(|uid| allowed.iter().any(|a| a.as_str() == Some(uid.as_str())))
                .collect();
            let method = match str_field(&request, "method") {
                "" => "get".to_string(),
                m => m.to_lowercase(),
            };
            let examples = uid_list(&request, "childUids");

            let mut out = object(request);
            out.remove("childUids");
            out.insert("parameters".into(), json!(parameters));
            out.insert("type".into(), json!("request"));
            out.insert("method".into(), json!(method));
            out.insert("examples".into(), json!(examples));
            out.insert("selectedSecuritySchemeUids".into(), json!(selected));
            out.insert("selectedServerUid".into(), json!(""));
            out.insert("servers".into(), json!([]));
            Value::Object(out)
        })
        .collect();

    let request_examples: Vec<Value> = rows(&data, "requestExamples")
        .into_iter()
        .map(|example| {
            let mut out = object(example);
            out.insert("type".into(), json!("requestExample"));
            Value::Object(out)
        })
        .collect();

    let security_schemes: Vec<Value> = rows(&data, "securitySchemes")
        .into_iter()
        .map(|scheme| {
            let key = name_key(&scheme);
            let is_oauth = str_field(&scheme, "type") == "oauth2";
            let client_id = str_field(&scheme, "clientId").to_string();
            let flow = scheme.get("flow").map(migrate_flow);
            let mut out = object(scheme);
            out.insert("nameKey".into(), json!(key));
            if is_oauth {
                out.insert("x-scalar-client-id".into(), json!(client_id));
                if let Some(flow) = flow {
                    out.insert("flow".into(), flow);
                }
            }
            Value::Object(out)
        })
        .collect();

    let servers: Vec<Value> = rows(&data, "servers")
        .into_iter()
        .map(|server| {
            let mut out = object(server);
            out.entry("variables").or_insert_with(|| json!({}));
            Value::Object(out)
        })
        .collect();

    let tags: Vec<Value> = rows(&data, "folders")
        .iter()
        .map(|folder| {
            let mut tag = json!({
                "type": "tag",
                "uid": folder.get("uid").cloned().unwrap_or(Value::Null),
                "name": non_empty_or(folder, "name", "unknownTag"),
                "children": uid_list(folder, "childUids"),
                "x-scalar-children": [],
            });
            if let Some(description) = folder.get("description") {
                tag["description"] = description.clone();
            }
            tag
        })
        .collect();

    let workspaces: Vec<Value> = rows(&data, "workspaces")
        .into_iter()
        .map(|workspace| {
            let cookies = uid_list(&workspace, "cookieUids");
            let collections = uid_list(&workspace, "collectionUids");
            let environments = uid_list(&workspace, "environmentUids");
            let mut out = object(workspace);
            for key in ["cookieUids", "collectionUids", "environmentUids"] {
                out.remove(key);
            }
            out.entry("description").or_insert_with(|| json!("Basic Scalar Workspace"));
            out.insert("cookies".into(), json!(cookies));
            out.insert("collections".into(), json!(collections));
            out.insert("environments".into(), json!(environments));
            Value::Object(out)
        })
        .collect();

    Ok(json!({
        "collections": collections,
        "cookies": rows(&data, "cookies"),
        "environments": environments,
        "requestExamples": request_examples,
        "requests": requests,
        "securitySchemes": security_schemes,
        "servers": servers,
        "tags": tags,
        "workspaces": workspaces,
    }))
}

// ── 2.1.0 -> 2.2.0 ─────────────────────────────────────────────────────

fn enable_rows(rows: Option<&mut Value>) {
    if let Some(Value::Array(rows)) = rows {
        for row in rows.iter_mut().filter_map(Value::as_object_mut) {
            row.entry("enabled").or_insert(Value::Bool(true));
        }
    }
}

fn migrate_v2_2_0(mut data: Value) -> Result<Value, StepError> {
    let root = data.as_object_mut().ok_or("data must be a map")?;
    for table in TABLES {
        root.entry(table).or_insert_with(|| json!([]));
    }

    if let Some(Value::Array(collections)) = root.get_mut("collections") {
        for collection in collections.iter_mut().filter_map(Value::as_object_mut) {
            collection.entry("watchMode").or_insert(Value::Bool(false));
            collection.entry("watchModeStatus").or_insert_with(|| json!("IDLE"));
        }
    }

    if let Some(Value::Array(schemes)) = root.get_mut("securitySchemes") {
        for scheme in schemes.iter_mut().filter_map(Value::as_object_mut) {
            if scheme.get("type").and_then(Value::as_str) != Some("oauth2") {
                continue;
            }
            let Some(Value::Object(mut flow)) = scheme.remove("flow") else {
                continue;
            };
            let kind = flow.get("type").and_then(Value::as_str).unwrap_or("implicit").to_string();
            let client_id = scheme.remove("x-scalar-client-id").unwrap_or_else(|| json!(""));
            flow.entry("x-scalar-client-id").or_insert(client_id);
            flow.entry("token").or_insert_with(|| json!(""));
            let mut flows = Map::new();
            flows.insert(kind, Value::Object(flow));
            scheme.insert("flows".into(), Value::Object(flows));
        }
    }

    if let Some(Value::Array(examples)) = root.get_mut("requestExamples") {
        for example in examples.iter_mut() {
            if let Some(Value::Object(params)) = example.get_mut("parameters") {
                for kind in ["path", "query", "headers", "cookies"] {
                    enable_rows(params.get_mut(kind));
                }
            }
            if let Some(form) = example.get_mut("body").and_then(|b| b.get_mut("formData")) {
                enable_rows(form.get_mut("value"));
            }
        }
    }

    Ok(data)
}
