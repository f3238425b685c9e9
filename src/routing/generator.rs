use super::route::{Route, parse_route_key};
use crate::config::RouteTemplate;
use std::collections::HashSet;

/// Case-fold a model name and strip a trailing `model` suffix.
///
/// `UserModel` becomes `user`; a model named just `Model` stays `model`.
pub fn normalize_model_name(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.strip_suffix("model") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}

/// Synthesize template routes for every model and append them to `routes`.
///
/// A generated route is skipped when its url is already declared
/// explicitly, so user routes always win. Returns the number of routes added.
pub fn generate_routes(templates: &[&RouteTemplate], models: &[String], routes: &mut Vec<Route>) -> usize {
    let declared: HashSet<String> = routes.iter().map(|route| route.url.clone()).collect();
    let mut added = 0;

    for model in models {
        let id = normalize_model_name(model);
        for template in templates {
            for (action, pattern) in &template.actions {
                let Some((method, url)) = parse_route_key(pattern) else {
                    tracing::warn!("Skipping malformed template pattern '{}' for '{}'", pattern, action);
                    continue;
                };
                let url = url.replace("{model}", &id);
                if declared.contains(&url) {
                    tracing::debug!("{} is declared explicitly; not generating {}.{}", url, template.controller, action);
                    continue;
                }

                routes.push(
                    Route::new(url, format!("{}.{}", template.controller, action))
                        .method(method)
                        .model(id.clone()),
                );
                added += 1;
            }
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn rest() -> RouteTemplate {
        RouteTemplate {
            controller: "DefaultController".to_string(),
            actions: BTreeMap::from([
                ("find".to_string(), "get /api/{model}".to_string()),
                ("create".to_string(), "post /api/{model}".to_string()),
                ("findOne".to_string(), "get /api/{model}/:id".to_string()),
            ]),
        }
    }

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(normalize_model_name("UserModel"), "user");
        assert_eq!(normalize_model_name("Post"), "post");
        assert_eq!(normalize_model_name("Model"), "model");
    }

    #[test]
    fn test_generates_routes_per_action() {
        let template = rest();
        let mut routes = Vec::new();
        let added = generate_routes(&[&template], &["UserModel".to_string()], &mut routes);
        assert_eq!(added, 3);

        let find = routes.iter().find(|r| r.handler_name() == Some("DefaultController.find")).unwrap();
        assert_eq!(find.url, "/api/user");
        assert_eq!(find.methods, vec!["get"]);
        assert_eq!(find.model.as_deref(), Some("user"));

        // Both verbs on the same url are generated
        assert_eq!(routes.iter().filter(|r| r.url == "/api/user").count(), 2);
    }

    #[test]
    fn test_explicit_routes_take_precedence() {
        let template = rest();
        let mut routes = vec![Route::new("/api/user", "UserController.list")];
        let added = generate_routes(&[&template], &["UserModel".to_string()], &mut routes);

        assert_eq!(added, 1);
        let on_list: Vec<_> = routes.iter().filter(|r| r.url == "/api/user").collect();
        assert_eq!(on_list.len(), 1);
        assert_eq!(on_list[0].handler_name(), Some("UserController.list"));
    }

    #[test]
    fn test_generation_is_idempotent_against_explicit_routes() {
        let template = rest();
        let models = vec!["UserModel".to_string(), "PostModel".to_string()];
        let mut first = vec![Route::new("/api/post", "PostController.list")];
        let mut second = first.clone();
        generate_routes(&[&template], &models, &mut first);
        generate_routes(&[&template], &models, &mut second);

        let urls = |routes: &[Route]| routes.iter().map(|r| format!("{:?} {}", r.methods, r.url)).collect::<Vec<_>>();
        assert_eq!(urls(&first), urls(&second));
    }
}
