//! Turns flags, the project file, a prior descriptor and prompts into one
//! validated [`InstanceDescriptor`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::coerce::coerce_toggle;
use super::model::{
    looks_like_path, merge, preselect, resolve_component_value, Field, Origin, Preselected,
    ProjectConfig, Selection,
};
use super::prompt::Prompter;
use crate::environment::descriptor::generate_autologin_key;
use crate::environment::{
    validate_slug, ComponentSource, InstanceDescriptor, Multisite, WordPressSource,
};
use crate::error::{EnvError, Result};
use crate::versions::{self, WordPressTag, TRUNK};

/// Slug used when neither a flag, the project file nor a prompt names one.
pub const DEFAULT_SLUG: &str = "wpdev-local";

pub const DEFAULT_TITLE: &str = "WordPress Dev";

/// PHP runtime aliases shipped as `php-fpm` images.
pub const SUPPORTED_PHP: &[&str] = &["8.0", "8.1", "8.2", "8.3", "8.4"];

pub const DEFAULT_PHP: &str = "8.2";

/// Sub-directories an application code checkout must contain.
pub const APP_CODE_LAYOUT: &[&str] = &[
    "client-mu-plugins",
    "plugins",
    "private",
    "themes",
    "vip-config",
];

/// How many times an invalid interactive answer is asked again.
pub const MAX_PROMPT_ATTEMPTS: usize = 5;

const MULTISITE_CHOICES: [(&str, Multisite); 3] = [
    ("No", Multisite::Off),
    ("Yes, with subdomains", Multisite::Subdomain),
    ("Yes, with subdirectories", Multisite::Subdirectory),
];

/// Everything the pipeline needs besides the raw values.
pub struct ResolveContext<'a> {
    pub prompter: &'a dyn Prompter,
    /// Manifest used to validate the WordPress selection.
    pub manifest: &'a [WordPressTag],
    /// Repository prefix for PHP runtime images.
    pub image_repository: &'a str,
    /// Base for relative directories given as flags or typed at a prompt.
    pub cwd: PathBuf,
}

/// Pick the slug: flag, then project file, then prompt, then the default.
pub fn resolve_slug(
    flag: Option<&str>,
    file: Option<&ProjectConfig>,
    prompter: &dyn Prompter,
) -> Result<String> {
    let slug = match flag.or(file.map(|f| f.slug.as_str())) {
        Some(slug) => slug.trim().to_string(),
        None if prompter.is_interactive() => prompter
            .input("Environment slug", DEFAULT_SLUG)?
            .trim()
            .to_string(),
        None => DEFAULT_SLUG.to_string(),
    };
    validate_slug(&slug)?;
    Ok(slug)
}

/// Resolve the descriptor of a new environment.
pub fn resolve_create(
    ctx: &ResolveContext<'_>,
    slug: &str,
    file: Option<&ProjectConfig>,
    flags: &BTreeMap<Field, String>,
) -> Result<InstanceDescriptor> {
    let preselected = merge(&file_layer(file), &flag_layer(ctx, flags));
    assemble(ctx, slug, &preselected, None)
}

/// Resolve the new descriptor of an existing environment. Fields nobody
/// overrides keep their prior value.
pub fn resolve_update(
    ctx: &ResolveContext<'_>,
    prior: &InstanceDescriptor,
    file: Option<&ProjectConfig>,
    flags: &BTreeMap<Field, String>,
) -> Result<InstanceDescriptor> {
    let below_flags = merge(&file_layer(file), &prior_layer(prior));
    let preselected = merge(&below_flags, &flag_layer(ctx, flags));
    assemble(ctx, &prior.slug, &preselected, Some(prior))
}

/// Command-line values. Relative component directories are taken from the
/// working directory, since the stack file lives elsewhere.
fn flag_layer(ctx: &ResolveContext<'_>, flags: &BTreeMap<Field, String>) -> Preselected {
    let values: BTreeMap<Field, String> = flags
        .iter()
        .map(|(field, value)| {
            let value = if field.allows_local() {
                resolve_component_value(value.trim(), &ctx.cwd)
            } else {
                value.clone()
            };
            (*field, value)
        })
        .collect();
    preselect(&values, Origin::Flag)
}

fn file_layer(file: Option<&ProjectConfig>) -> Preselected {
    file.map(|f| preselect(&f.values, Origin::File))
        .unwrap_or_default()
}

/// The user-facing values of a descriptor, as if they had been typed.
fn prior_layer(prior: &InstanceDescriptor) -> Preselected {
    let mut values = BTreeMap::from([
        (Field::Title, prior.title.clone()),
        (Field::Multisite, prior.multisite.to_string()),
        (Field::Php, prior.php_version.clone()),
        (Field::WordPress, prior.wordpress.tag.clone()),
        (Field::MuPlugins, component_value(&prior.mu_plugins)),
        (Field::AppCode, component_value(&prior.app_code)),
        (Field::Elasticsearch, prior.elasticsearch.to_string()),
        (Field::PhpMyAdmin, prior.php_my_admin.to_string()),
        (Field::Xdebug, prior.xdebug.to_string()),
        (Field::MailCatcher, prior.mail_catcher.to_string()),
        (Field::MediaProxy, prior.media_proxy.to_string()),
    ]);
    if let Some(config) = &prior.xdebug_config {
        values.insert(Field::XdebugConfig, config.clone());
    }
    if let Some(domain) = &prior.media_redirect_domain {
        values.insert(Field::MediaRedirectDomain, domain.clone());
    }
    preselect(&values, Origin::Prior)
}

fn component_value(source: &ComponentSource) -> String {
    match source {
        ComponentSource::Local { dir } => dir.to_string_lossy().into_owned(),
        ComponentSource::Image { tag: None } => "image".to_string(),
        ComponentSource::Image { tag: Some(tag) } => tag.clone(),
    }
}

fn assemble(
    ctx: &ResolveContext<'_>,
    slug: &str,
    preselected: &Preselected,
    prior: Option<&InstanceDescriptor>,
) -> Result<InstanceDescriptor> {
    let get = move |field: Field| preselected.get(&field);

    let title = match get(Field::Title) {
        Some(s) => s.value.clone(),
        None => ctx.prompter.input(Field::Title.label(), DEFAULT_TITLE)?,
    };

    let multisite = match get(Field::Multisite) {
        Some(s) => Multisite::parse(&s.value).ok_or_else(|| EnvError::InvalidValue {
            field: Field::Multisite.key().to_string(),
            value: s.value.clone(),
            expected: "a boolean, `subdomain` or `subdirectory`".to_string(),
        })?,
        None => {
            let options: Vec<String> = MULTISITE_CHOICES.iter().map(|(l, _)| l.to_string()).collect();
            let choice = ctx.prompter.select(Field::Multisite.label(), &options, 0)?;
            MULTISITE_CHOICES.get(choice).map(|(_, m)| *m).unwrap_or_default()
        }
    };

    let php_version = match get(Field::Php) {
        Some(s) => php_image(&s.value, ctx.image_repository)?,
        None => {
            let options: Vec<String> = SUPPORTED_PHP.iter().map(|v| v.to_string()).collect();
            let default = SUPPORTED_PHP.iter().position(|v| *v == DEFAULT_PHP).unwrap_or(0);
            let choice = ctx.prompter.select(Field::Php.label(), &options, default)?;
            let alias = SUPPORTED_PHP.get(choice).copied().unwrap_or(DEFAULT_PHP);
            php_image(alias, ctx.image_repository)?
        }
    };

    let wordpress = resolve_wordpress(ctx, get(Field::WordPress), prior)?;
    let mu_plugins = resolve_component(ctx, Field::MuPlugins, get(Field::MuPlugins))?;
    let app_code = resolve_component(ctx, Field::AppCode, get(Field::AppCode))?;

    let elasticsearch = resolve_toggle(ctx, Field::Elasticsearch, get(Field::Elasticsearch))?;
    let php_my_admin = resolve_toggle(ctx, Field::PhpMyAdmin, get(Field::PhpMyAdmin))?;
    let xdebug = resolve_toggle(ctx, Field::Xdebug, get(Field::Xdebug))?;
    let xdebug_config = get(Field::XdebugConfig)
        .map(|s| s.value.trim().to_string())
        .filter(|v| !v.is_empty());
    let mail_catcher = resolve_toggle(ctx, Field::MailCatcher, get(Field::MailCatcher))?;

    let mut media_redirect_domain = get(Field::MediaRedirectDomain)
        .map(|s| s.value.trim().to_string())
        .filter(|v| !v.is_empty());
    let media_proxy = if media_redirect_domain.is_some() {
        true
    } else {
        resolve_toggle(ctx, Field::MediaProxy, get(Field::MediaProxy))?
    };
    if media_proxy && media_redirect_domain.is_none() {
        media_redirect_domain = Some(prompt_redirect_domain(ctx)?);
    }

    Ok(InstanceDescriptor {
        slug: slug.to_string(),
        title,
        multisite,
        php_version,
        maria_db_version: prior.and_then(|p| p.maria_db_version.clone()),
        wordpress,
        mu_plugins,
        app_code,
        elasticsearch,
        php_my_admin,
        xdebug,
        xdebug_config,
        mail_catcher,
        media_proxy,
        media_redirect_domain,
        pull_after: prior.map(|p| p.pull_after).unwrap_or(0),
        autologin_key: prior
            .map(|p| p.autologin_key.clone())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(generate_autologin_key),
    })
}

/// Map a PHP alias to its runtime image. Full image references pass
/// through unchanged.
pub fn php_image(value: &str, repository: &str) -> Result<String> {
    let value = value.trim();
    if value.contains('/') || value.contains(':') {
        return Ok(value.to_string());
    }
    if SUPPORTED_PHP.contains(&value) {
        return Ok(format!("{}/php-fpm:{}", repository, value));
    }
    Err(EnvError::InvalidValue {
        field: Field::Php.key().to_string(),
        value: value.to_string(),
        expected: format!("one of {}", SUPPORTED_PHP.join(", ")),
    })
}

fn resolve_wordpress(
    ctx: &ResolveContext<'_>,
    selection: Option<&Selection>,
    prior: Option<&InstanceDescriptor>,
) -> Result<WordPressSource> {
    let requested = match selection {
        Some(s) => s.value.trim().to_string(),
        None if ctx.prompter.is_interactive() => {
            let options: Vec<String> = ctx.manifest.iter().map(|t| t.tag.clone()).collect();
            if options.is_empty() {
                String::new()
            } else {
                let default = versions::newest_stable(ctx.manifest)
                    .and_then(|n| options.iter().position(|o| *o == n.tag))
                    .unwrap_or(0);
                let choice = ctx.prompter.select(Field::WordPress.label(), &options, default)?;
                options.get(choice).cloned().unwrap_or_default()
            }
        }
        None => String::new(),
    };

    // An unchanged tag keeps its pinned build and upgrade preference.
    if let Some(prior) = prior {
        if prior.wordpress.tag == requested {
            return Ok(prior.wordpress.clone());
        }
    }

    let entry = versions::resolve(ctx.manifest, Some(requested.as_str()).filter(|r| !r.is_empty()))?;
    debug!(requested = %requested, tag = %entry.tag, reference = %entry.reference, "resolved WordPress version");
    let reference = (entry.tag != TRUNK).then_some(entry.reference.as_str());
    Ok(WordPressSource::image(&entry.tag, reference))
}

/// Interpret a component value: directories become local sources,
/// anything else names an image tag.
pub fn parse_component(value: &str) -> ComponentSource {
    let value = value.trim();
    if looks_like_path(value) {
        return ComponentSource::Local {
            dir: PathBuf::from(crate::platform::expand_home(value)),
        };
    }
    match value {
        "" | "image" => ComponentSource::Image { tag: None },
        tag => ComponentSource::Image {
            tag: Some(tag.to_string()),
        },
    }
}

/// Check that a local component directory can be mounted.
pub fn validate_component_dir(field: Field, dir: &Path) -> Result<()> {
    let invalid = |reason: String| EnvError::InvalidComponentPath {
        component: field.key().to_string(),
        path: dir.to_path_buf(),
        reason,
    };

    if !dir.is_dir() {
        return Err(invalid("the directory does not exist".to_string()));
    }
    let mut entries = std::fs::read_dir(dir).map_err(|e| invalid(e.to_string()))?;
    if entries.next().is_none() {
        return Err(invalid("the directory is empty".to_string()));
    }

    if field == Field::AppCode {
        let missing: Vec<&str> = APP_CODE_LAYOUT
            .iter()
            .copied()
            .filter(|sub| !dir.join(sub).is_dir())
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!(
                "missing expected sub-directories: {}",
                missing.join(", ")
            )));
        }
    }
    Ok(())
}

fn check_component(field: Field, value: &str) -> Result<ComponentSource> {
    let source = parse_component(value);
    if let ComponentSource::Local { dir } = &source {
        validate_component_dir(field, dir)?;
    }
    Ok(source)
}

fn resolve_component(
    ctx: &ResolveContext<'_>,
    field: Field,
    selection: Option<&Selection>,
) -> Result<ComponentSource> {
    let first_error = match selection {
        Some(s) => match check_component(field, &s.value) {
            Ok(source) => return Ok(source),
            Err(err) if ctx.prompter.is_interactive() => {
                warn!(component = %field, error = %err, "rejected component directory");
                err
            }
            Err(err) => return Err(err),
        },
        None if !ctx.prompter.is_interactive() => return Ok(ComponentSource::default()),
        None => {
            let message = format!(
                "{}: path to a local directory, or `image` for the demo image",
                field.label()
            );
            return ask_component(ctx, field, &message);
        }
    };

    let message = format!(
        "{}: {}. Enter another directory, or `image`",
        field.label(),
        first_error
    );
    ask_component(ctx, field, &message)
}

fn ask_component(ctx: &ResolveContext<'_>, field: Field, message: &str) -> Result<ComponentSource> {
    let mut last_error = None;
    for _ in 0..MAX_PROMPT_ATTEMPTS {
        let answer = ctx.prompter.input(message, "image")?;
        let answer = resolve_component_value(answer.trim(), &ctx.cwd);
        match check_component(field, &answer) {
            Ok(source) => return Ok(source),
            Err(err) => {
                warn!(component = %field, error = %err, "rejected component directory");
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| EnvError::MissingValue {
        field: field.label().to_string(),
        flag: field.key().to_string(),
    }))
}

fn resolve_toggle(
    ctx: &ResolveContext<'_>,
    field: Field,
    selection: Option<&Selection>,
) -> Result<bool> {
    if let Some(on) = coerce_toggle(field.key(), selection.map(|s| s.value.as_str()))? {
        return Ok(on);
    }
    ctx.prompter
        .confirm(&format!("Enable {}?", field.label()), false)
}

fn prompt_redirect_domain(ctx: &ResolveContext<'_>) -> Result<String> {
    let missing = || EnvError::MissingValue {
        field: Field::MediaRedirectDomain.label().to_string(),
        flag: Field::MediaRedirectDomain.key().to_string(),
    };
    if !ctx.prompter.is_interactive() {
        return Err(missing());
    }
    for _ in 0..MAX_PROMPT_ATTEMPTS {
        let answer = ctx
            .prompter
            .input("Domain to redirect missing media files to", "")?;
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
    }
    Err(missing())
}
