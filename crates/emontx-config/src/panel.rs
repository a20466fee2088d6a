//! Sidebar panel registration

use std::path::Path;

use ha_frontend::{Frontend, FrontendError, Panel};
use serde_json::json;
use tracing::info;

use crate::constants::{
    PANEL_ASSET, PANEL_COMPONENT, PANEL_ICON, PANEL_TITLE, PANEL_URL_PATH, STATIC_URL_PATH,
};

/// The iframe panel pointing at the bundled page
pub fn emontx_panel() -> Panel {
    Panel::new(PANEL_COMPONENT, PANEL_URL_PATH)
        .sidebar(PANEL_TITLE, PANEL_ICON)
        .config(json!({ "url": format!("{}/{}", STATIC_URL_PATH, PANEL_ASSET) }))
        .require_admin(true)
}

/// Serve the frontend directory and add the panel to the sidebar
pub fn register_panel(frontend: &Frontend, frontend_dir: &Path) -> Result<(), FrontendError> {
    frontend.register_static_path(STATIC_URL_PATH, frontend_dir, false)?;
    frontend.register_built_in_panel(emontx_panel())?;
    info!("emonTx panel registered");
    Ok(())
}

pub fn remove_panel(frontend: &Frontend) -> bool {
    frontend.remove_panel(PANEL_URL_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_panel() {
        let frontend = Frontend::new();
        register_panel(&frontend, Path::new("/srv/emontx")).unwrap();

        let panel = frontend.get_panel(PANEL_URL_PATH).unwrap();
        assert_eq!(panel.component_name, "iframe");
        assert_eq!(panel.sidebar_title.as_deref(), Some("emonTx Config"));
        assert_eq!(panel.sidebar_icon.as_deref(), Some("mdi:lightning-bolt"));
        assert_eq!(
            panel.config,
            Some(json!({"url": "/emontx_config_static/panel.html"}))
        );
        assert!(panel.require_admin);

        let paths = frontend.static_paths();
        assert_eq!(paths[0].url_path, STATIC_URL_PATH);
        assert_eq!(paths[0].path, Path::new("/srv/emontx"));
        assert!(!paths[0].cache_headers);
    }

    #[test]
    fn test_second_registration_rejected() {
        let frontend = Frontend::new();
        register_panel(&frontend, Path::new("/srv/emontx")).unwrap();

        let result = register_panel(&frontend, Path::new("/srv/other"));
        assert!(matches!(result, Err(FrontendError::PanelExists(_))));

        assert!(remove_panel(&frontend));
        assert!(!remove_panel(&frontend));
        register_panel(&frontend, Path::new("/srv/emontx")).unwrap();
    }
}
