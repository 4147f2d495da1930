
    use super::*;
    use std::sync::Arc;

    fn sample_registry() -> TypeRegistry {
        TypeRegistry::builder()
            .agent_type(
                AgentTypeDescriptor::new("Echo")
                    .with_description("echoes payloads")
                    .handling("echo"),
            )
            .agent_type(AgentTypeDescriptor::new("Sink"))
            .schema(MessageSchema::new("agents.TextMessage"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let registry = sample_registry();

        let echo = registry.resolve("Echo").expect("Echo registered");
        assert_eq!(echo.description, "echoes payloads");
        assert!(registry.resolve("Missing").is_none());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.type_names(), vec!["Echo", "Sink"]);
    }

    #[test]
    fn test_handles() {
        let registry = sample_registry();

        assert!(registry.handles("Echo", "echo"));
        assert!(!registry.handles("Echo", "shout"));
        // Empty event set accepts anything
        assert!(registry.handles("Sink", "whatever"));
        // Unknown type handles nothing
        assert!(!registry.handles("Missing", "echo"));
    }

    #[test]
    fn test_schema_lookup() {
        let registry = sample_registry();
        assert!(registry.schema("agents.TextMessage").is_some());
        assert!(registry.schema("agents.Other").is_none());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let result = TypeRegistry::builder()
            .agent_type(AgentTypeDescriptor::new("Echo"))
            .agent_type(AgentTypeDescriptor::new("Echo"))
            .build();
        assert!(matches!(result, Err(Error::Registry(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = TypeRegistry::builder()
            .agent_type(AgentTypeDescriptor::new("  "))
            .build();
        assert!(result.is_err());

        let result = TypeRegistry::builder()
            .schema(MessageSchema::new(""))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_registry() {
        let registry = TypeRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.resolve("Echo").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_reads() {
        let registry = Arc::new(sample_registry());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.handles("Echo", "echo") })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
    }
