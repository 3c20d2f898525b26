//! 层级配置文件集成测试

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use desk::config::AppConfig;
    use desk::hierarchy::{AgentRegistry, HierarchyError, Level};
    use desk::tools::Backoffice;
    use desk::{AgentError, EngineBuilder, RouteRequest};

    const ORDER_ONLY: &str = r#"
[root]
id = "director"
level = 0
injection_method = "task_router"

[[root.children]]
id = "order_center"
level = 1
injection_method = "agent_tool"

[[root.children.children]]
id = "order_detail"
level = 2
injection_method = "base_tool"

[[root.children.children]]
id = "order_cancellation"
level = 2
injection_method = "base_tool"

[[root.children]]
id = "product_publish"
level = 2
injection_method = "base_tool"
"#;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_toml_tree() {
        let file = write_temp(".toml", ORDER_ONLY);
        let registry = AgentRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.root().id, "director");
        assert_eq!(registry.children("order_center").len(), 2);
        assert_eq!(registry.get("product_publish").unwrap().level, Level::Leaf);
    }

    #[test]
    fn test_injection_mismatch_rejected() {
        let bad = ORDER_ONLY.replacen("injection_method = \"agent_tool\"", "injection_method = \"base_tool\"", 1);
        let file = write_temp(".toml", &bad);
        let err = AgentRegistry::load(file.path()).unwrap_err();
        assert!(matches!(err, HierarchyError::InjectionMismatch { .. }));
    }

    #[test]
    fn test_json_tree_with_duplicate_id() {
        let json = r#"{
            "root": {
                "id": "director", "level": 0, "injection_method": "task_router",
                "children": [
                    {"id": "order_detail", "level": 2, "injection_method": "base_tool"},
                    {"id": "order_detail", "level": 2, "injection_method": "base_tool"}
                ]
            }
        }"#;
        let file = write_temp(".json", json);
        let err = AgentRegistry::load(file.path()).unwrap_err();
        assert_eq!(err, HierarchyError::DuplicateId("order_detail".into()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AgentRegistry::load(std::path::Path::new("/nonexistent/hierarchy.toml")).unwrap_err();
        assert!(matches!(err, HierarchyError::Io(_)));
    }

    #[tokio::test]
    async fn test_engine_uses_configured_tree() {
        let file = write_temp(".toml", ORDER_ONLY);
        let mut config = AppConfig::default();
        config.hierarchy.path = Some(file.path().to_path_buf());
        let bo = Arc::new(Backoffice::seeded());
        let engine = EngineBuilder::new(config)
            .with_backoffice(bo.clone())
            .build()
            .unwrap();

        let tree = engine.tree_display();
        assert!(tree.contains("order_cancellation"));
        assert!(!tree.contains("product_center"));

        // 商品上架直接挂在总指挥下
        let resp = engine
            .handle(RouteRequest::new("s1", "u1", "下架商品B"))
            .await;
        assert!(resp.errors.is_empty(), "{}", resp.response);
        assert_eq!(bo.write_count().await, 1);
    }

    #[test]
    fn test_unimplemented_leaf_fails_build() {
        let file = write_temp(
            ".toml",
            &ORDER_ONLY.replace("order_cancellation", "order_refund"),
        );
        let mut config = AppConfig::default();
        config.hierarchy.path = Some(file.path().to_path_buf());
        let err = EngineBuilder::new(config).build().err().unwrap();
        assert!(matches!(
            err,
            AgentError::Hierarchy(HierarchyError::UnknownLeaf(_))
        ));
    }
}
