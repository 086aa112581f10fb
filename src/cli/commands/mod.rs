use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

fn cert_arg() -> Arg {
    Arg::new("cert")
        .default_value("node.crt")
        .env("TLSGATE_CERT")
        .help("Path of the node certificate (PEM)")
        .long("cert")
        .short('c')
        .value_name("PATH")
}

fn key_arg() -> Arg {
    Arg::new("key")
        .default_value("node.key")
        .env("TLSGATE_KEY")
        .help("Path of the node private key (PEM, written with mode 0600)")
        .long("key")
        .short('k')
        .value_name("PATH")
}

fn common_name_arg() -> Arg {
    Arg::new("common-name")
        .env("TLSGATE_COMMON_NAME")
        .help("Common name and DNS name of the node certificate")
        .long("common-name")
        .short('n')
        .value_name("NAME")
        .required(true)
}

/// One hundred years
pub const MAX_LIFETIME_DAYS: i64 = 36_500;

fn lifetime_days_arg() -> Arg {
    Arg::new("lifetime-days")
        .default_value("365")
        .env("TLSGATE_LIFETIME_DAYS")
        .help("Validity of a newly issued certificate, in days")
        .long("lifetime-days")
        .value_name("DAYS")
        .value_parser(clap::value_parser!(u32).range(1..=MAX_LIFETIME_DAYS))
}

/// Pure clap command definitions with zero business logic
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .help("Increase verbosity, -v for debug, -vv for trace")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve /metrics and /health over HTTP and HTTPS on a single port")
                .arg(
                    Arg::new("listen")
                        .env("TLSGATE_LISTEN")
                        .help("IP address to bind to (default: [::]:port, accepts both IPv6 and IPv4)")
                        .long("listen")
                        .long_help(
                            "IP address to bind to:\n\
                            Not specified (default) binds to [::]:port which accepts both IPv6 and IPv4 connections.\n\
                            Falls back to 0.0.0.0:port if IPv6 is unavailable.\n\n\
                            Specific IPv4 examples: '0.0.0.0', '127.0.0.1'\n\
                            Specific IPv6: '::', '::1'"
                        )
                        .short('l')
                        .value_name("IP"),
                )
                .arg(
                    Arg::new("port")
                        .default_value("9443")
                        .env("TLSGATE_PORT")
                        .help("Listening port for both TLS and plaintext peers")
                        .long("port")
                        .short('p')
                        .value_parser(clap::value_parser!(u16)),
                )
                .arg(cert_arg())
                .arg(key_arg())
                .arg(common_name_arg())
                .arg(lifetime_days_arg())
                .arg(
                    Arg::new("renew-within-days")
                        .default_value("30")
                        .env("TLSGATE_RENEW_WITHIN_DAYS")
                        .help("Issue a new certificate when the current one expires within this many days")
                        .long("renew-within-days")
                        .value_name("DAYS")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    Arg::new("tls-policy")
                        .default_value("tls13")
                        .env("TLSGATE_TLS_POLICY")
                        .help("Minimum TLS version: tls13, tls12")
                        .long("tls-policy")
                        .long_help(
                            "Minimum TLS version accepted from peers:\n\n\
                            - tls13: TLS 1.3 only (default)\n\
                            - tls12: TLS 1.2 and 1.3, TLS 1.2 limited to ECDHE with \
                            AES-GCM or ChaCha20-Poly1305, server suite order preferred"
                        )
                        .value_name("POLICY")
                        .value_parser(["tls13", "tls12"]),
                )
                .arg(
                    Arg::new("sniff-timeout-ms")
                        .default_value("1000")
                        .env("TLSGATE_SNIFF_TIMEOUT_MS")
                        .help("How long to wait for a peer's first byte before passing it through as plaintext")
                        .long("sniff-timeout-ms")
                        .value_name("MS")
                        .value_parser(clap::value_parser!(u64).range(1..)),
                ),
        )
        .subcommand(
            Command::new("generate")
                .about("Issue a new self-signed node certificate and exit")
                .arg(cert_arg())
                .arg(key_arg())
                .arg(common_name_arg())
                .arg(lifetime_days_arg()),
        )
}
