use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.batch_size, 16);
    assert_eq!(config.llm.model, "llama3-8b-8192");
    assert_eq!(config.llm.api_key_env, "GROQ_API_KEY");
    assert_eq!(config.chunking.chunk_size, 1200);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.retrieval.top_k, 3);
    assert!(!config.index.verify_source);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.llm.base_url = "not a url".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.llm.temperature = 3.5;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTemperature(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    let mut invalid_config = config;
    invalid_config.agents.remote_urls = vec!["::nope::".to_string()];
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));
}

#[test]
fn chunking_overlap_must_be_smaller_than_chunk_size() {
    let mut config = Config::default();
    config.chunking.chunk_size = 200;
    config.chunking.overlap = 200;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(200, 200))
    ));

    config.chunking.overlap = 199;
    assert!(config.validate().is_ok());
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    // base_dir is not serialized
    assert_eq!(config.llm, parsed_config.llm);
    assert_eq!(config.ollama, parsed_config.ollama);
    assert_eq!(config.chunking, parsed_config.chunking);
    assert_eq!(config.index, parsed_config.index);
    assert_eq!(config.agents, parsed_config.agents);
}

#[test]
fn ollama_setter_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("new-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());
    assert!(config.set_embedding_dimension(384).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());
    assert!(config.set_embedding_dimension(8).is_err());
}

#[test]
fn llm_setter_validation() {
    let mut config = LlmConfig::default();

    assert!(config.set_base_url("http://localhost:8080/v1".to_string()).is_ok());
    assert!(config.set_model("llama3-70b-8192".to_string()).is_ok());
    assert!(config.set_temperature(0.0).is_ok());
    assert!(config.set_api_key_env("OPENAI_API_KEY".to_string()).is_ok());

    assert!(config.set_base_url("ftp://example.com".to_string()).is_err());
    assert!(config.set_model("   ".to_string()).is_err());
    assert!(config.set_temperature(-0.1).is_err());
    assert!(config.set_api_key_env(String::new()).is_err());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("missing file yields defaults");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.llm, LlmConfig::default());
}

#[test]
fn relative_paths_resolve_against_base_dir() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());

    assert_eq!(config.document_path(), temp_dir.path().join("hospital.pdf"));
    assert_eq!(config.snapshot_path(), temp_dir.path().join("vectorstore"));

    let absolute = temp_dir.path().join("elsewhere").join("policy.pdf");
    config.index.document = absolute.clone();
    assert_eq!(config.document_path(), absolute);
}

#[test]
fn dispatcher_model_falls_back_to_llm_model() {
    let mut config = Config::default();
    assert_eq!(config.dispatcher_model(), "llama3-70b-8192");

    config.agents.dispatcher_model = None;
    assert_eq!(config.dispatcher_model(), "llama3-8b-8192");
}

#[test]
#[serial]
fn api_key_is_read_from_environment() {
    let config = LlmConfig {
        api_key_env: "ACP_AGENTS_TEST_API_KEY".to_string(),
        ..LlmConfig::default()
    };

    // SAFETY: serialized with other environment tests
    unsafe { std::env::remove_var("ACP_AGENTS_TEST_API_KEY") };
    assert!(matches!(
        config.api_key(),
        Err(ConfigError::MissingApiKey(_))
    ));

    // SAFETY: serialized with other environment tests
    unsafe { std::env::set_var("ACP_AGENTS_TEST_API_KEY", "secret") };
    assert_eq!(config.api_key().expect("key is set"), "secret");

    // SAFETY: serialized with other environment tests
    unsafe { std::env::remove_var("ACP_AGENTS_TEST_API_KEY") };
}

#[test]
#[serial]
fn home_directory_can_be_overridden() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    // SAFETY: serialized with other environment tests
    unsafe { std::env::set_var(HOME_ENV_VAR, temp_dir.path()) };
    let home = Config::default_home().expect("home resolves");
    // SAFETY: serialized with other environment tests
    unsafe { std::env::remove_var(HOME_ENV_VAR) };

    assert_eq!(home, temp_dir.path());
}
