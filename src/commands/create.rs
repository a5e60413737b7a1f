use anyhow::Result;
use owo_colors::OwoColorize;

use super::Session;
use crate::cli::EnvOptions;
use crate::config::pipeline::resolve_create;
use crate::environment::{EnvironmentRegistry, InstanceDescriptor};
use crate::error::EnvError;
use crate::versions::WordPressTag;

pub async fn run(session: &Session, options: &EnvOptions) -> Result<()> {
    let manifest = session.manifest().await;
    let descriptor = create(session, options, &manifest)?;

    let use_color = crate::ui::summary::use_color();
    let slug = &descriptor.slug;
    if use_color {
        println!("{} environment {}", "Created".green().bold(), slug.cyan());
    } else {
        println!("Created environment {}", slug);
    }
    crate::ui::summary::print_descriptor(&descriptor, &session.settings.domain);
    println!("Start it with: wpdev start --slug {}", slug);
    Ok(())
}

/// Resolve, persist and render a new environment.
pub fn create(
    session: &Session,
    options: &EnvOptions,
    manifest: &[WordPressTag],
) -> crate::error::Result<InstanceDescriptor> {
    let file = session.project_config()?;
    let slug = session.new_slug(file.as_ref())?;
    if EnvironmentRegistry::exists(&session.registry.path_for(&slug)?) {
        return Err(EnvError::AlreadyExists { slug });
    }

    let ctx = session.resolve_context(manifest);
    let descriptor = resolve_create(&ctx, &slug, file.as_ref(), &options.fields())?;
    session.registry.write(&descriptor)?;
    session.write_stack(&descriptor)?;
    tracing::info!(slug = %descriptor.slug, "environment created");
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{manifest, session};
    use crate::compose::stack::{read_stack, STACK_FILE};
    use crate::environment::Multisite;

    #[test]
    fn defaults_produce_a_complete_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), Some("demo-1"));
        let d = create(&s, &EnvOptions::default(), &manifest()).unwrap();

        assert_eq!(d.slug, "demo-1");
        assert_eq!(d.multisite, Multisite::Off);
        assert!(!d.autologin_key.is_empty());
        assert_eq!(s.registry.read("demo-1").unwrap(), d);

        let stack = read_stack(&s.registry.path_for("demo-1").unwrap().join(STACK_FILE)).unwrap();
        assert!(stack.services.contains_key("nginx"));
        assert!(stack.tooling.contains_key("wp"));
    }

    #[test]
    fn existing_slug_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), Some("demo"));
        create(&s, &EnvOptions::default(), &manifest()).unwrap();
        let err = create(&s, &EnvOptions::default(), &manifest()).unwrap_err();
        assert!(matches!(err, EnvError::AlreadyExists { ref slug } if slug == "demo"));
    }

    #[test]
    fn flags_override_the_project_file() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), None);
        std::fs::write(
            tmp.path().join("work").join(".wpdev.yml"),
            "configuration-version: 1\nslug: site\ntitle: From File\nxdebug: true\n",
        )
        .unwrap();
        let options = EnvOptions {
            title: Some("From Flag".into()),
            ..Default::default()
        };
        let d = create(&s, &options, &manifest()).unwrap();
        assert_eq!(d.slug, "site");
        assert_eq!(d.title, "From Flag");
        assert!(d.xdebug);
    }

    #[test]
    fn unknown_wordpress_version_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), Some("demo"));
        let options = EnvOptions {
            wordpress: Some("4.1".into()),
            ..Default::default()
        };
        let err = create(&s, &options, &manifest()).unwrap_err();
        assert!(matches!(err, EnvError::UnknownVersion { .. }));
        assert!(!EnvironmentRegistry::exists(&s.registry.path_for("demo").unwrap()));
    }
}
