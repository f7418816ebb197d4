//! User-visible Russian strings (§4.7, §4.8, §6). Collected in one module,
//! the way `text_constants` groups them in the original service, rather than
//! inlined at every call site.

pub const ABOUT_GAME: &str = "Поле чудес! Угадывайте буквы или называйте слово целиком. Нажмите Старт 🚀, чтобы начать игру.";
pub const WANT_TO_PLAY: &str = "Хотите начать игру?";
pub const NO_QUESTIONS_LEFT: &str = "К сожалению, вопросы закончились, создайте новые!";

pub fn riddle(question_text: &str) -> String {
    format!("Внимание, загадка! {}?", question_text)
}

pub fn next_turn_prompt(name: &str, last_name: &str) -> String {
    format!("{} {}, ваш ход! Выберите букву или слово.", name, last_name)
}

pub fn last_player_prompt(name: &str, last_name: &str) -> String {
    format!(
        "{} {}, вы остались последним игроком — назовите слово целиком!",
        name, last_name
    )
}

pub fn action_prompt(name: &str) -> String {
    format!(
        "{} напишите букву/слово согласно раннее выбранному варианту!",
        name
    )
}

pub fn choose_one_letter(name: &str, last_name: &str) -> String {
    format!("{} {} выберите 1 букву!", name, last_name)
}

pub fn letter_already_revealed(name: &str) -> String {
    format!("{}, такая буква уже названа!", name)
}

pub fn no_such_letter(name: &str) -> String {
    format!("{} такой буквы нет!", name)
}

pub fn display_and_choose_again(display_word: &str) -> String {
    format!("{}. Снова выберите букву или слово", display_word)
}

pub fn name_a_word(name: &str, last_name: &str) -> String {
    format!("{} {} назовите слово!", name, last_name)
}

pub fn user_kicked(name: &str, last_name: &str) -> String {
    format!("{} {} неверно, вы исключены из игры!", name, last_name)
}

pub fn congratulations(name: &str, last_name: &str, answer_text: &str, leaderboard: &str) -> String {
    format!(
        "{} {} поздравляю вы выиграли! {} верный ответ! {}",
        name, last_name, answer_text, leaderboard
    )
}

pub fn game_over(leaderboard: &str) -> String {
    format!("Игра окончена. {}", leaderboard)
}

pub fn game_leaderboard_header(game_id: i64) -> String {
    format!("Таблица лидеров игры номер {} - ", game_id)
}

pub const NO_ONE_PLAYED: &str = "Никто еще не играл.";
pub const WORLD_LEADERBOARD_HEADER: &str = "Общее количество баллов за все игры:";
