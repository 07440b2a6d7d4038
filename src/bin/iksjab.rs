/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::env;
use std::process::ExitCode;

use ikstream::ConnectionEvent;
use ikstream::Jid;
use ikstream::TlsPolicy;
use ikstream::XmppClient;
use tracing_subscriber::EnvFilter;

fn print_version() {
    println!("iksjab (ikstream) v{}", ikstream::VERSION);
}

fn print_usage() {
    println!(concat!(
        "Usage: iksjab [OPTIONS]\n",
        "This tool can communicate over XMPP.\n",
        "Options:\n",
        "  -j, --jid <JID>        Jabber ID\n",
        "  -s, --server <HOST>    Connect to this host instead of the JID domain\n",
        "  -r, --resource <NAME>  Resource to bind\n",
        "  -t, --tls <POLICY>     TLS policy: required, optional or disabled\n",
        "  -d, --debug            Log the protocol traffic\n",
        "  -h, --help             Display this help message and exit\n",
        "  -v, --version          Display the version and exit\n",
        "The password is read from the IKSJAB_PASSWORD environment variable\n",
        "or asked on the terminal.\n",
        "Report issues at https://github.com/meduketto/iksemel-rust/issues"
    ));
}

struct Options {
    jid: Jid,
    server: Option<String>,
    resource: Option<String>,
    tls_policy: TlsPolicy,
    debug: bool,
}

fn parse_args() -> Result<Option<Options>, String> {
    let mut args = env::args();
    let mut jid: Option<Jid> = None;
    let mut server = None;
    let mut resource = None;
    let mut tls_policy = TlsPolicy::Required;
    let mut debug = false;

    // Skip the first argument (program name)
    args.next();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-j" | "--jid" => {
                let value = args
                    .next()
                    .ok_or(format!("Jabber ID expected after {arg}"))?;
                jid = Some(Jid::new(&value).map_err(|err| err.to_string())?);
            }
            "-s" | "--server" => {
                server = Some(args.next().ok_or(format!("host expected after {arg}"))?);
            }
            "-r" | "--resource" => {
                resource = Some(args.next().ok_or(format!("resource expected after {arg}"))?);
            }
            "-t" | "--tls" => {
                let value = args.next().ok_or(format!("policy expected after {arg}"))?;
                tls_policy = match value.as_str() {
                    "required" => TlsPolicy::Required,
                    "optional" => TlsPolicy::Optional,
                    "disabled" => TlsPolicy::Disabled,
                    _ => return Err(format!("unknown TLS policy '{value}'")),
                };
            }
            "-d" | "--debug" => debug = true,
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            "-v" | "--version" => {
                print_version();
                return Ok(None);
            }
            _ => return Err(format!("unknown option '{arg}'")),
        }
    }
    let jid = jid.ok_or("Jabber ID is required, see --help".to_string())?;
    Ok(Some(Options {
        jid,
        server,
        resource,
        tls_policy,
        debug,
    }))
}

async fn run(options: Options, password: String) -> Result<(), ikstream::ConnectionError> {
    let mut builder = XmppClient::builder(options.jid)
        .password(&password)
        .server(options.server)
        .tls_policy(options.tls_policy);
    if options.resource.is_some() {
        builder = builder.resource(options.resource.as_deref());
    }
    let mut client = builder.connect().await?;
    client.wait_for_session().await?;
    if let Some(jid) = client.connection().jid() {
        eprintln!("Connected as {jid}");
    }
    while let Some(event) = client.next_event().await {
        match event {
            ConnectionEvent::Stanza(stanza) => println!("{stanza}"),
            ConnectionEvent::StreamClose => break,
            ConnectionEvent::Error(err) => return Err(err),
            _ => {}
        }
    }
    client.disconnect().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let options = match parse_args() {
        Ok(Some(options)) => options,
        Ok(None) => return ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let filter = if options.debug {
        EnvFilter::new("ikstream=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let password = match env::var("IKSJAB_PASSWORD") {
        Ok(password) => password,
        Err(_) => match rpassword::prompt_password("Password: ") {
            Ok(password) => password,
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        },
    };

    match run(options, password).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
