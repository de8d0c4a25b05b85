use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use mxb_core::{
    config::Config, export::ExportWriter, exporter::MemberExporter, gate::CommandGate,
    messaging::port::MessagingPort,
};
use mxb_tdlib::TdGatewayClient;
use mxb_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> Result<(), mxb_core::Error> {
    mxb_core::logging::init("mxb")?;

    let cfg = Config::load()?;

    let chats = Arc::new(TdGatewayClient::new(
        cfg.tdlib_gateway_url.clone(),
        cfg.tdlib_request_timeout,
    )?);
    match chats.get_me().await {
        Ok(me) => tracing::info!(user_id = me.user_id().0, "tdlib session ready"),
        Err(e) => tracing::warn!(error = %e, "tdlib getMe failed"),
    }

    let bot = mxb_telegram::Bot::new(cfg.telegram_bot_token.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let exporter = Arc::new(MemberExporter::new(
        chats,
        ExportWriter::new(cfg.export_dir.clone()),
        cfg.page_size,
    ));
    let gate = Arc::new(CommandGate::new(
        cfg.admin_user_id,
        cfg.export_command.clone(),
        exporter,
        messenger,
    ));

    tracing::info!(
        export_dir = %cfg.export_dir.display(),
        page_size = cfg.page_size,
        command = %cfg.export_command,
        "member export bot starting"
    );

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, shutting down");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    mxb_telegram::router::run_polling(bot, gate, cfg.update_queue_capacity, shutdown)
        .await
        .map_err(|e| mxb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
