use crate::rclone::TransferSnapshot;
use std::time::Duration;

const BYTE_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, BYTE_UNITS[0])
    } else {
        format!("{:.2} {}", value, BYTE_UNITS[unit])
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}ч {:02}м {:02}с", hours, minutes, seconds)
    } else {
        format!("{}м {:02}с", minutes, seconds)
    }
}

pub fn render_transfer_status(snapshot: &TransferSnapshot) -> String {
    let state = if snapshot.is_cancelled {
        "Отменяется"
    } else if snapshot.is_errored {
        "Ошибка"
    } else {
        "Выгрузка"
    };
    let mut text = format!(
        "📤 {}: {}\n\n\
         Прогресс: {}\n\
         Передано: {} ({})\n\
         Скорость: {} ({}/s)\n\
         ETA: {}\n\
         Прошло: {}\n\
         Движок: Rclone",
        state,
        snapshot.name,
        snapshot.percentage,
        snapshot.transferred_size,
        format_bytes(snapshot.processed_bytes),
        snapshot.speed,
        format_bytes(snapshot.speed_bytes),
        snapshot.eta,
        format_elapsed(snapshot.elapsed),
    );
    if snapshot.total_files > 0 || snapshot.checks > 0 {
        text.push_str(&format!(
            "\nФайлы: {}/{} · проверено: {}",
            snapshot.transferred_files, snapshot.total_files, snapshot.checks
        ));
    }
    text
}

pub fn rclone_setup_text() -> &'static str {
    r#"<b>Подключение Google Drive</b>

1) Нажмите «🔑 Авторизовать».
2) Разрешите доступ в браузере.
3) Скопируйте код авторизации (или адрес страницы, куда вас перенаправило).
4) Отправьте его сюда следующим сообщением."#
}

pub fn help_text() -> &'static str {
    r#"Команды:
/rclone — подключить свой Google Drive
/upload <файл> — выгрузить файл из папки загрузок на ваш диск
/status — состояние текущей выгрузки
/cancel — отменить текущую выгрузку
/help — эта справка

Сначала подключите диск через /rclone, затем используйте /upload."#
}
