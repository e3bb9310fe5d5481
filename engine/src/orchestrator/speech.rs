//! Fixed kiosk utterances

use kiosk_sdk::types::MemoryCandidate;

pub const STT_FALLBACK: &str = "ごめんね、うまく聞き取れなかったよ。もう一回お話ししてね。";
pub const CHAT_FALLBACK: &str = "ごめんね、いまちょっと考えがまとまらないよ。もう一回お話ししてね。";
pub const CONSENT_REASK: &str = "おぼえていいかな？「いいよ」か「だめ」で教えてね。";
pub const CONSENT_THANKS: &str = "ありがとう！おぼえておくね。";
pub const CONSENT_DECLINED: &str = "わかった、おぼえないでおくね。";
pub const CONSENT_FORGET: &str = "じゃあ、今のことは忘れるね。";
pub const ROOM_ACK: &str = "みんなのお話にもどるね。";

pub fn personal_ack(name: &str) -> String {
    format!("{}さん、いっしょにお話ししよう！", name)
}

pub fn consent_question(candidate: &MemoryCandidate) -> String {
    format!("「{}」のこと、おぼえていてもいい？", candidate.value)
}
