use stagehand::AppError;

#[test]
fn display_prefixes_identify_the_domain() {
    let cases = [
        (AppError::Protocol("bad header".into()), "protocol: bad header"),
        (AppError::Install("twice".into()), "install: twice"),
        (
            AppError::BindExhausted("100 attempts".into()),
            "bind exhausted: 100 attempts",
        ),
        (
            AppError::Supervisor("no greeting".into()),
            "supervisor: no greeting",
        ),
        (AppError::Config("bad toml".into()), "config: bad toml"),
        (AppError::Io("pipe closed".into()), "io: pipe closed"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn toml_errors_land_in_the_config_variant() {
    let parse_err = toml::from_str::<toml::Value>("= not toml =").unwrap_err();
    let err: AppError = parse_err.into();
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn errors_are_std_error() {
    fn takes_std_error(_: &dyn std::error::Error) {}
    takes_std_error(&AppError::Protocol("x".into()));
}
