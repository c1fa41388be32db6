//! Russian HTML message texts and inline keyboards.

use crate::channels::traits::InlineButton;
use crate::dates::format_date;
use crate::model::{Completion, Shift, Task, TaskId};
use crate::policy;
use chrono::NaiveDate;

/// Callback data prefix of the completion button.
pub const COMPLETE_PREFIX: &str = "complete_";

/// Escape text for Telegram's HTML parse mode.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Task id from `complete_<id>` callback data.
#[must_use]
pub fn parse_complete_callback(data: &str) -> Option<TaskId> {
    data.strip_prefix(COMPLETE_PREFIX)?.trim().parse().ok()
}

#[must_use]
pub fn complete_button(task: &Task) -> InlineButton {
    InlineButton {
        text: format!("✅ Выполнено: {}", task.name),
        callback_data: format!("{COMPLETE_PREFIX}{}", task.id),
    }
}

pub fn welcome_text() -> String {
    "☕️ Добро пожаловать в систему управления чисткой оборудования!\n\n\
     Я помогу тебе отслеживать задачи по чистке оборудования в кофейне.\n\n\
     📋 Доступные команды:\n\
     /tasks - Показать мои задачи на сегодня\n\
     /history - История выполненных задач (7 дней)\n\
     /help - Справка по командам\n\n\
     Перед сменой я пришлю список задач на день.\n\
     Просто нажми кнопку \"✅ Выполнено\" когда закончишь задачу!"
        .to_owned()
}

pub fn help_text(is_admin: bool) -> String {
    let mut text = "📖 Справка по командам:\n\n\
                    /start - Приветствие и инструкция\n\
                    /tasks - Показать задачи на сегодня\n\
                    /history - История за последние 7 дней\n\
                    /help - Эта справка\n"
        .to_owned();
    if is_admin {
        text.push_str("/refresh - Перечитать таблицу\n");
    }
    text.push_str(
        "\n🔔 Как работает бот:\n\
         • Перед сменой я проверяю расписание\n\
         • Отправляю список задач по чистке\n\
         • Ты отмечаешь выполненные задачи кнопками\n\
         • Данные автоматически сохраняются в таблицу\n\n\
         ⚠️ Важно:\n\
         • <i>Курсив</i> = просроченная задача\n\
         • ✅ = задача выполнена\n\
         • ⏳ = задача в ожидании",
    );
    text
}

pub fn no_username_text() -> String {
    "❌ У тебя не установлен Telegram username. \
     Пожалуйста, установи username в настройках Telegram."
        .to_owned()
}

pub fn not_member_text() -> String {
    "⛔️ Ты не найден в списке сотрудников. Обратись к управляющему.".to_owned()
}

pub fn no_shift_text(date: NaiveDate) -> String {
    format!(
        "📅 На {} у тебя нет смены или ты не добавлен в расписание.",
        format_date(date)
    )
}

pub fn no_shift_callback_text() -> String {
    "❌ Ты не найден в расписании на сегодня.".to_owned()
}

pub fn no_tasks_text(date: NaiveDate) -> String {
    format!("✨ На {} нет задач по чистке!", format_date(date))
}

pub fn task_not_found_text() -> String {
    "❌ Задача не найдена. Открой список заново: /tasks".to_owned()
}

pub fn admin_only_text() -> String {
    "⛔️ Команда доступна только администратору.".to_owned()
}

pub fn unknown_command_text() -> String {
    "🤔 Неизвестная команда. Список команд: /help".to_owned()
}

pub fn refresh_result_text(ok: bool, tasks: usize, shifts: usize) -> String {
    if ok {
        format!("🔄 Данные обновлены: задач {tasks}, смен сегодня {shifts}.")
    } else {
        "❌ Не удалось обновить данные из таблицы. Попробуй позже.".to_owned()
    }
}

fn task_line(text: &mut String, task: &Task, today: NaiveDate) {
    let name = escape_html(&task.name);
    if task.is_done() {
        let when = task
            .completed_at
            .map_or_else(|| "сегодня".to_owned(), |at| format!("в {}", at.format("%H:%M")));
        text.push_str(&format!("✅ <b>{name}</b> (выполнено {when})\n"));
        return;
    }
    match policy::days_overdue(task, today) {
        0 => {
            text.push_str(&format!("⏳ <b>{name}</b>\n"));
        }
        days => {
            let since = policy::due_since(task).map(format_date).unwrap_or_default();
            text.push_str(&format!(
                "⏳ <b>{name}</b> <i>(просрочена с {since}, дней: {days})</i>\n"
            ));
        }
    }
}

fn greeting(text: &mut String, shift: &Shift, today: NaiveDate) {
    text.push_str(&format!(
        "☕️ <b>Доброе утро, {}!</b>\n",
        escape_html(shift.first_name())
    ));
    text.push_str(&format!("Задачи на {}:\n\n", format_date(today)));
}

/// Task list with a completion button for every pending task.
pub fn tasks_message(
    tasks: &[Task],
    shift: &Shift,
    today: NaiveDate,
) -> (String, Vec<Vec<InlineButton>>) {
    let mut text = String::new();
    greeting(&mut text, shift, today);
    for task in tasks {
        task_line(&mut text, task, today);
    }
    let done = tasks.iter().filter(|t| t.is_done()).count();
    text.push_str(&format!("\n<b>Выполнено: {done}/{}</b>", tasks.len()));

    let keyboard = tasks
        .iter()
        .filter(|t| !t.is_done())
        .map(|t| vec![complete_button(t)])
        .collect();
    (text, keyboard)
}

/// Shift-start notification. Same list as `/tasks` plus a hint.
pub fn notification_message(
    tasks: &[Task],
    shift: &Shift,
    today: NaiveDate,
) -> (String, Vec<Vec<InlineButton>>) {
    let (mut text, keyboard) = tasks_message(tasks, shift, today);
    if let Some(start) = shift.start_time {
        text.push_str(&format!("\n🕒 Смена начинается в {}", start.format("%H:%M")));
    }
    text.push_str("\n\n💡 Нажми кнопку \"✅ Выполнено\" после завершения каждой задачи.");
    (text, keyboard)
}

pub fn history_message(history: &[Task], days: u64) -> String {
    if history.is_empty() {
        return format!("📜 Ты не выполнял задач за последние {days} дней.");
    }
    let mut text = format!("📜 <b>История выполненных задач ({days} дней):</b>\n\n");
    for task in history {
        text.push_str(&format!(
            "{} <b>{}</b>\n",
            task.status.mark(),
            escape_html(&task.name)
        ));
        text.push_str(&format!("   📅 {}\n", task.last_completed_date));
        if let Some(by) = &task.completed_by {
            text.push_str(&format!("   👤 {}\n", escape_html(by)));
        }
        text.push('\n');
    }
    text.trim_end().to_owned()
}

/// Manager summary of today's shifts and due tasks.
pub fn digest_message(today: NaiveDate, tasks: &[Task], shifts: &[Shift]) -> String {
    let mut text = format!("📊 <b>Сводка на {}</b>\n\n", format_date(today));

    if shifts.is_empty() {
        text.push_str("👥 Смен сегодня нет\n");
    } else {
        text.push_str("👥 <b>Смены:</b>\n");
        for shift in shifts {
            let hours = match (shift.start_time, shift.end_time) {
                (Some(start), Some(end)) => {
                    format!(" ({}–{})", start.format("%H:%M"), end.format("%H:%M"))
                }
                (Some(start), None) => format!(" (с {})", start.format("%H:%M")),
                _ => String::new(),
            };
            text.push_str(&format!(
                "• {} @{}{hours}\n",
                escape_html(&shift.employee_name),
                escape_html(&shift.user_handle)
            ));
        }
    }

    text.push('\n');
    if tasks.is_empty() {
        text.push_str("✨ Задач по чистке на сегодня нет");
    } else {
        let overdue = tasks
            .iter()
            .filter(|t| policy::is_overdue(t, today))
            .count();
        text.push_str(&format!("🧽 <b>Задачи ({}):</b>\n", tasks.len()));
        for task in tasks {
            task_line(&mut text, task, today);
        }
        if overdue > 0 {
            text.push_str(&format!("\n⚠️ Просрочено: {overdue}"));
        }
    }
    text.trim_end().to_owned()
}

/// Report of completions that never reached the sheet.
pub fn unsynced_report(completions: &[Completion], tasks: &[Task]) -> String {
    let mut text = "⚠️ <b>Не удалось записать в таблицу:</b>\n\n".to_owned();
    for completion in completions {
        let name = tasks
            .iter()
            .find(|t| t.id == completion.task_id)
            .map_or_else(|| format!("строка {}", completion.task_id), |t| t.name.clone());
        text.push_str(&format!(
            "• {}: {} ({})\n",
            escape_html(&name),
            escape_html(&completion.completed_by),
            completion.completed_at.format("%d.%m.%Y %H:%M")
        ));
    }
    text.push_str("\nОтметь эти задачи в таблице вручную.");
    text
}
