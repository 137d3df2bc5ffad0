//! Language guess for fallback replies.
//!
//! When generation fails there is no model output to mirror the user's
//! language, so [`detect_locale`] guesses it from characters that only a few
//! languages use. Anything without a telltale diacritic is English.

/// Languages with localized fallback text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    English,
    Vietnamese,
    Turkish,
    German,
    Spanish,
    Portuguese,
    French,
}

/// Why the extractor is answering with a canned reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Empty, too short, unparseable, or off-schema output.
    Unclear,
    /// A call-level fault talking to the backend.
    Busy,
    /// The backend throttled us.
    RateLimited,
    /// No backend credentials.
    NotConfigured,
}

// Checked in order: a character listed earlier wins over later tables.
const VIETNAMESE: &[char] = &[
    'ă', 'ơ', 'ư', 'đ', 'ạ', 'ả', 'ấ', 'ầ', 'ẩ', 'ẫ', 'ậ', 'ắ', 'ằ', 'ẳ', 'ẵ', 'ặ', 'ẹ', 'ẻ', 'ẽ',
    'ế', 'ề', 'ể', 'ễ', 'ệ', 'ỉ', 'ị', 'ọ', 'ỏ', 'ố', 'ồ', 'ổ', 'ỗ', 'ộ', 'ớ', 'ờ', 'ở', 'ỡ', 'ợ',
    'ụ', 'ủ', 'ứ', 'ừ', 'ử', 'ữ', 'ự', 'ỳ', 'ỵ', 'ỷ', 'ỹ',
];
const TURKISH: &[char] = &['ğ', 'ş', 'ı', 'İ', 'Ğ', 'Ş'];
const GERMAN: &[char] = &['ä', 'ß', 'Ä', 'Ö', 'Ü'];
const SPANISH: &[char] = &['ñ', '¿', '¡', 'Ñ'];
const PORTUGUESE: &[char] = &['ã', 'õ', 'Ã', 'Õ'];
const FRENCH: &[char] = &['è', 'ë', 'î', 'ï', 'ù', 'û', 'œ', 'æ', 'ÿ', 'à'];

/// Guess the language of `text` from diacritics.
pub fn detect_locale(text: &str) -> Locale {
    let tables: [(&[char], Locale); 6] = [
        (VIETNAMESE, Locale::Vietnamese),
        (TURKISH, Locale::Turkish),
        (GERMAN, Locale::German),
        (SPANISH, Locale::Spanish),
        (PORTUGUESE, Locale::Portuguese),
        (FRENCH, Locale::French),
    ];

    for (chars, locale) in tables {
        if text.chars().any(|c| chars.contains(&c)) {
            return locale;
        }
    }

    // Shared diacritics: weak signals, resolved by frequency.
    let count = |set: &[char]| text.chars().filter(|c| set.contains(c)).count();
    let german = count(&['ö', 'ü']);
    let romance = count(&['á', 'é', 'í', 'ó', 'ú', 'ç', 'ê', 'â', 'ô']);
    if german > 0 && german >= romance {
        return Locale::German;
    }
    if count(&['ç', 'ê', 'â', 'ô']) > 0 {
        return Locale::Portuguese;
    }
    if count(&['é']) > 0 && count(&['á', 'í', 'ó', 'ú']) == 0 {
        return Locale::French;
    }
    if romance > 0 {
        return Locale::Spanish;
    }
    Locale::English
}

/// Canned reply for `reason` in `locale`.
pub fn fallback_text(reason: FallbackReason, locale: Locale) -> &'static str {
    use FallbackReason::*;
    use Locale::*;

    match (reason, locale) {
        (Unclear, English) => "Sorry, I couldn't quite work that out. Could you rephrase it?",
        (Unclear, Vietnamese) => "Xin lỗi, tôi chưa hiểu rõ yêu cầu. Bạn có thể nói lại được không?",
        (Unclear, Turkish) => "Üzgünüm, bunu tam anlayamadım. Başka bir şekilde söyler misiniz?",
        (Unclear, German) => "Entschuldigung, das habe ich nicht ganz verstanden. Kannst du es anders formulieren?",
        (Unclear, Spanish) => "Lo siento, no lo entendí bien. ¿Puedes decirlo de otra forma?",
        (Unclear, Portuguese) => "Desculpe, não entendi bem. Pode reformular o pedido?",
        (Unclear, French) => "Désolé, je n'ai pas bien compris. Peux-tu reformuler ?",

        (Busy, English) => "The system is busy right now. Please try again in a moment.",
        (Busy, Vietnamese) => "Hệ thống đang bận. Vui lòng thử lại sau giây lát.",
        (Busy, Turkish) => "Sistem şu anda meşgul. Lütfen biraz sonra tekrar deneyin.",
        (Busy, German) => "Das System ist gerade ausgelastet. Bitte versuche es gleich noch einmal.",
        (Busy, Spanish) => "El sistema está ocupado. Inténtalo de nuevo en un momento.",
        (Busy, Portuguese) => "O sistema está ocupado. Tente novamente em instantes.",
        (Busy, French) => "Le système est occupé. Réessaie dans un instant.",

        (RateLimited, English) => "I'm getting a lot of requests right now. Please wait a little and try again.",
        (RateLimited, Vietnamese) => "Hiện có quá nhiều yêu cầu. Vui lòng đợi một chút rồi thử lại.",
        (RateLimited, Turkish) => "Şu anda çok fazla istek var. Lütfen biraz bekleyip tekrar deneyin.",
        (RateLimited, German) => "Gerade kommen sehr viele Anfragen an. Bitte warte kurz und versuche es erneut.",
        (RateLimited, Spanish) => "Estoy recibiendo muchas solicitudes. Espera un poco y vuelve a intentarlo.",
        (RateLimited, Portuguese) => "Estou recebendo muitas solicitações. Aguarde um pouco e tente de novo.",
        (RateLimited, French) => "Je reçois beaucoup de demandes. Patiente un peu et réessaie.",

        (NotConfigured, English) => "The assistant is not configured yet, so I can't process requests.",
        (NotConfigured, Vietnamese) => "Trợ lý chưa được cấu hình nên chưa thể xử lý yêu cầu.",
        (NotConfigured, Turkish) => "Asistan henüz yapılandırılmadı, bu yüzden istekleri işleyemiyorum.",
        (NotConfigured, German) => "Der Assistent ist noch nicht eingerichtet und kann keine Anfragen bearbeiten.",
        (NotConfigured, Spanish) => "El asistente aún no está configurado, así que no puedo procesar solicitudes.",
        (NotConfigured, Portuguese) => "O assistente ainda não está configurado, então não posso processar pedidos.",
        (NotConfigured, French) => "L'assistant n'est pas encore configuré, je ne peux pas traiter les demandes.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ascii_is_english() {
        assert_eq!(detect_locale("Send 10 SUI to Ali"), Locale::English);
        assert_eq!(detect_locale(""), Locale::English);
    }

    #[test]
    fn detects_distinctive_diacritics() {
        assert_eq!(detect_locale("Gửi 10 SUI cho Ali được không"), Locale::Vietnamese);
        assert_eq!(detect_locale("Ali'ye 10 SUI gönder, teşekkürler"), Locale::Turkish);
        assert_eq!(detect_locale("Schick Ali bitte 10 SUI, danke schön, Grüße aus Köln"), Locale::German);
        assert_eq!(detect_locale("¿Puedes enviar 10 SUI a Ali?"), Locale::Spanish);
        assert_eq!(detect_locale("Envie 10 SUI para o João"), Locale::Portuguese);
        assert_eq!(detect_locale("Envoie 10 SUI à Ali, s'il te plaît"), Locale::French);
    }

    #[test]
    fn weak_signals_resolve_by_frequency() {
        assert_eq!(detect_locale("Envía 10 SUI a Ali"), Locale::Spanish);
        assert_eq!(detect_locale("Préparé le café"), Locale::French);
        assert_eq!(detect_locale("Überweise für mich"), Locale::German);
    }

    #[test]
    fn every_reason_has_text_for_every_locale() {
        let locales = [
            Locale::English,
            Locale::Vietnamese,
            Locale::Turkish,
            Locale::German,
            Locale::Spanish,
            Locale::Portuguese,
            Locale::French,
        ];
        let reasons = [
            FallbackReason::Unclear,
            FallbackReason::Busy,
            FallbackReason::RateLimited,
            FallbackReason::NotConfigured,
        ];
        for locale in locales {
            for reason in reasons {
                assert!(!fallback_text(reason, locale).is_empty());
            }
        }
    }
}
