//! Modèles d'URL des services Kuwo
//!
//! Les URLs de base sont remplaçables (tests, miroirs) ; les paramètres de
//! requête suivent ceux du client de bureau Kuwo.

/// Nombre de chansons par page d'artiste
pub const PAGE_SIZE: u32 = 50;

/// URLs de base des services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub search: String,
    pub quku: String,
    pub toplist: String,
    pub song: String,
    pub lyric: String,
    pub img_cdn: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            search: "http://search.kuwo.cn/r.s?".into(),
            quku: "http://qukudata.kuwo.cn/q.k?".into(),
            toplist: "http://kbangserver.kuwo.cn/ksong.s?".into(),
            song: "http://antiserver.kuwo.cn/anti.s?".into(),
            lyric: "http://newlyric.kuwo.cn/newlyric.lrc?".into(),
            img_cdn: "http://img4.kwcdn.kuwo.cn/".into(),
        }
    }
}

impl Endpoints {
    /// Toutes les URLs pointent sous une même racine (ex: un serveur de test)
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            search: format!("{base}/r.s?"),
            quku: format!("{base}/q.k?"),
            toplist: format!("{base}/ksong.s?"),
            song: format!("{base}/anti.s?"),
            lyric: format!("{base}/newlyric.lrc?"),
            img_cdn: format!("{base}/"),
        }
    }

    pub fn artist_songs(&self, artist: &str, page: u32) -> String {
        format!(
            "{}ft=music&rn={PAGE_SIZE}&itemset=newkw&newsearch=1&cluster=0\
             &primitive=0&rformat=json&encoding=UTF8&artist={}&pn={page}",
            self.search,
            urlencoding::encode(artist),
        )
    }

    pub fn nodes(&self, nid: u64) -> String {
        format!(
            "{}op=query&fmt=json&src=mbox&cont=ninfo&rn=500&node={nid}&pn=0",
            self.quku
        )
    }

    pub fn toplist_songs(&self, nid: u64) -> String {
        format!(
            "{}from=pc&fmt=json&type=bang&data=content&rn=200&id={nid}",
            self.toplist
        )
    }

    pub fn artist_info_by_name(&self, artist: &str) -> String {
        format!(
            "{}stype=artistinfo&artist={}",
            self.search,
            urlencoding::encode(artist)
        )
    }

    pub fn artist_info_by_id(&self, artistid: u64) -> String {
        format!("{}stype=artistinfo&artistid={artistid}", self.search)
    }

    pub fn search_songs(&self, keyword: &str, page: u32) -> String {
        format!(
            "{}ft=music&rn=200&newsearch=1&primitive=0&cluster=0\
             &itemset=newkm&rformat=json&encoding=utf8&all={}&pn={page}",
            self.search,
            urlencoding::encode(keyword),
        )
    }

    /// Lien de téléchargement d'une chanson ou d'un clip
    pub fn song_link(&self, rid: &str, high_res: bool, use_mv: bool) -> String {
        let format = match (use_mv, high_res) {
            (true, true) => "mkv|mp4",
            (true, false) => "mp4",
            (false, true) => "ape|mp3",
            (false, false) => "mp3",
        };
        format!(
            "{}response=url&type=convert_url&format={format}&rid=MUSIC_{rid}",
            self.song
        )
    }

    pub fn album_cover(&self, path: &str) -> String {
        format!("{}star/albumcover/{}", self.img_cdn, path.trim())
    }

    /// Portrait d'un artiste, ramené au format 120x120
    ///
    /// Le champ `pic` des fiches commence par la taille (`55/`, `90/`,
    /// `100/`), remplacée ici par `120/`.
    pub fn artist_logo(&self, pic: &str) -> String {
        let pic = pic.trim();
        let pic = match pic.split_once('/') {
            Some(("55" | "90" | "100", rest)) => format!("120/{rest}"),
            _ => pic.to_string(),
        };
        format!("{}star/starheads/{pic}", self.img_cdn)
    }
}
