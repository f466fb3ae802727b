use packwire_session::{ConnectionState, ReceivedEvent, SessionConfig, Subscription};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::{open_session, runtime, ListenArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_event, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let stop = CancellationToken::new();
    install_ctrlc_handler(stop.clone())?;
    let subscription = subscription(&args);

    runtime()?.block_on(async {
        let config = SessionConfig {
            max_retries: args.retries,
            ..SessionConfig::default()
        };
        let session = open_session(&args.server, config).await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        session
            .receive_event(subscription, move |event: &ReceivedEvent| {
                let _ = tx.send(event.clone());
            })
            .map_err(|err| session_error("subscribe failed", err))?;
        info!(events = ?args.events, "listening");

        let mut state = session.watch_state();
        let mut printed = 0usize;
        let outcome = loop {
            tokio::select! {
                _ = stop.cancelled() => break Ok(SUCCESS),
                event = rx.recv() => {
                    let Some(event) = event else { break Ok(SUCCESS) };
                    print_event(&event, format);
                    printed = printed.saturating_add(1);
                    if args.count.is_some_and(|count| printed >= count) {
                        break Ok(SUCCESS);
                    }
                }
                changed = state.changed() => {
                    let gave_up = changed.is_err()
                        || *state.borrow_and_update() == ConnectionState::Disconnected;
                    if gave_up {
                        break Err(CliError::new(
                            TRANSPORT_ERROR,
                            "connection lost and reconnect gave up",
                        ));
                    }
                }
            }
        };
        session.disconnect();
        outcome
    })
}

fn subscription(args: &ListenArgs) -> Subscription {
    let mut subscription = Subscription::events(args.events.iter().copied())
        .arguments(args.arguments.iter().copied());
    if let Some(subtype) = args.subtype {
        subscription = subscription.subtype(subtype);
    }
    subscription
}

fn install_ctrlc_handler(stop: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || stop.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::ServerArgs;

    fn args(events: Vec<u8>, arguments: Vec<u8>, subtype: Option<u8>) -> ListenArgs {
        ListenArgs {
            server: ServerArgs {
                host: "127.0.0.1".into(),
                port: "8080".into(),
                path: "/api".into(),
                connect_timeout: "5s".into(),
            },
            events,
            arguments,
            subtype,
            count: None,
            retries: 0,
        }
    }

    #[test]
    fn subscription_carries_every_filter() {
        let sub = subscription(&args(vec![3, 4], vec![7], Some(1)));
        assert_eq!(sub.event_list(), &[3, 4]);
        assert_eq!(sub.argument_list(), &[7]);
        assert_eq!(sub.subtype_filter(), Some(1));
    }

    #[test]
    fn bare_subscription() {
        let sub = subscription(&args(vec![9], Vec::new(), None));
        assert_eq!(sub.argument_list(), &[] as &[u8]);
        assert_eq!(sub.subtype_filter(), None);
    }
}
